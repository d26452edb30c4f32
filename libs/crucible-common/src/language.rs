// Language profile registry
//
// The single source of truth for which languages can be executed and how.
// Changing a toolchain means editing one row of PROFILES, nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported languages. Discriminants index into `PROFILES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python = 0,
    JavaScript = 1,
    TypeScript = 2,
    Kotlin = 3,
    Java = 4,
    Cpp = 5,
    Go = 6,
}

/// How a submission in one language is laid out and run.
///
/// `run_command` is handed to `sh -c` with `/app/code` as the working
/// directory. The source mount is read-only, so build artifacts go to `/tmp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageProfile {
    pub language: Language,
    pub image: &'static str,
    pub filename: &'static str,
    pub run_command: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

static PROFILES: [LanguageProfile; 7] = [
    LanguageProfile {
        language: Language::Python,
        image: "python:3.11-slim",
        filename: "solution.py",
        run_command: "python solution.py",
    },
    LanguageProfile {
        language: Language::JavaScript,
        image: "node:18-alpine",
        filename: "solution.js",
        run_command: "node solution.js",
    },
    LanguageProfile {
        language: Language::TypeScript,
        image: "node:18-alpine",
        filename: "solution.ts",
        run_command: "npm install --silent --prefix /tmp/tsc typescript >/dev/null \
            && /tmp/tsc/node_modules/.bin/tsc solution.ts --outDir /tmp/dist --target ES2020 --module CommonJS \
            && node /tmp/dist/solution.js",
    },
    LanguageProfile {
        language: Language::Kotlin,
        image: "eclipse-temurin:17-jdk-alpine",
        filename: "Solution.kt",
        run_command: "kotlinc Solution.kt -include-runtime -d /tmp/Solution.jar && java -jar /tmp/Solution.jar",
    },
    LanguageProfile {
        language: Language::Java,
        image: "eclipse-temurin:17-jdk-alpine",
        filename: "Solution.java",
        run_command: "javac -d /tmp/classes Solution.java && java -cp /tmp/classes Solution",
    },
    LanguageProfile {
        language: Language::Cpp,
        image: "gcc:latest",
        filename: "solution.cpp",
        run_command: "g++ -O2 -o /tmp/solution solution.cpp && /tmp/solution",
    },
    LanguageProfile {
        language: Language::Go,
        image: "golang:1.21-alpine",
        filename: "main.go",
        run_command: "go run main.go",
    },
];

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Kotlin,
        Language::Java,
        Language::Cpp,
        Language::Go,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Kotlin => "kotlin",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::Go => "go",
        }
    }

    pub fn profile(self) -> &'static LanguageProfile {
        &PROFILES[self as usize]
    }

    /// Full command vector for the container entrypoint
    pub fn command(self) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            self.profile().run_command.to_string(),
        ]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    /// Case-insensitive exact match; no trimming, no aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedLanguage(s.to_string()))
    }
}

/// All registry rows, in declaration order
pub fn profiles() -> &'static [LanguageProfile] {
    &PROFILES
}
