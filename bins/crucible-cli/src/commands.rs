// CLI commands for running code and managing language images
use anyhow::{bail, Context, Result};
use crucible_common::language::{profiles, Language};
use crucible_common::types::{ExecutionRequest, ExecutionResult};
use crucible_common::EngineConfig;
use crucible_engine::{ExecutionEngine, ImageStatus};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Exit status used for timeouts, same as coreutils `timeout`
pub const TIMEOUT_EXIT_CODE: i32 = 124;

pub struct RunOptions {
    pub language: String,
    pub file: PathBuf,
    pub stdin: Option<PathBuf>,
    pub timeout_ms: u64,
    pub cpu: f64,
    pub memory_mb: u64,
    pub json: bool,
}

impl RunOptions {
    fn to_request(&self) -> Result<ExecutionRequest> {
        let source = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let stdin = match &self.stdin {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            None => String::new(),
        };

        Ok(ExecutionRequest::new(&self.language, source)
            .with_stdin(stdin)
            .with_timeout_ms(self.timeout_ms)
            .with_cpu_quota(self.cpu)
            .with_memory_limit_bytes(self.memory_mb.saturating_mul(1024 * 1024)))
    }
}

fn connect() -> Result<ExecutionEngine> {
    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    ExecutionEngine::connect(&config).context("Failed to set up Docker client")
}

/// Process exit status mirroring the sandboxed program's
pub fn exit_code_for(result: &ExecutionResult) -> i32 {
    match result.exit_code {
        None => TIMEOUT_EXIT_CODE,
        Some(code) => i32::try_from(code).unwrap_or(1),
    }
}

/// Execute a file and mirror its output; returns the exit status to use
pub async fn run(options: &RunOptions) -> Result<i32> {
    let request = options.to_request()?;
    let engine = connect()?;

    let result = match engine.execute(&request).await {
        Ok(result) => result,
        Err(e) => bail!("Execution failed: {}", e),
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.output);
        eprint!("{}", result.error);
        if result.timed_out() {
            eprintln!();
        }
        if result.output_truncated {
            eprintln!("⚠️  Output was truncated");
        }
        std::io::stdout().flush()?;
    }

    Ok(exit_code_for(&result))
}

pub fn list_languages() {
    println!("📋 Supported Languages:\n");
    println!("{:<12} {:<32} {:<16}", "LANGUAGE", "IMAGE", "FILE");
    println!("{}", "─".repeat(60));

    for profile in profiles() {
        println!(
            "{:<12} {:<32} {:<16}",
            profile.language.as_str(),
            profile.image,
            profile.filename
        );
    }

    println!("\n✅ Total: {} language(s)", profiles().len());
}

/// Images needed for one language, or for all of them (deduplicated)
fn images_for(language: Option<&str>) -> Result<Vec<&'static str>> {
    match language {
        Some(name) => {
            let language: Language = name.parse()?;
            Ok(vec![language.profile().image])
        }
        None => {
            let unique: BTreeSet<&'static str> = profiles().iter().map(|p| p.image).collect();
            Ok(unique.into_iter().collect())
        }
    }
}

pub async fn pull_images(language: Option<&str>) -> Result<()> {
    let images = images_for(language)?;
    let engine = connect()?;

    engine.ping().await.context("Docker is not reachable")?;

    let mut failed = 0;
    for image in &images {
        println!("🐳 {}...", image);
        match engine.images().ensure(image).await {
            Ok(ImageStatus::Cached) => println!("  ✅ already present"),
            Ok(ImageStatus::Pulled) => println!("  ✅ pulled"),
            Err(e) => {
                println!("  ❌ {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} image(s) could not be pulled", failed, images.len());
    }

    println!("\n✅ {} image(s) ready", images.len());
    Ok(())
}
