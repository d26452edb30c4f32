pub mod config;
pub mod language;
pub mod types;

pub use config::{ConfigError, EngineConfig};
pub use language::{Language, LanguageProfile, UnsupportedLanguage};
pub use types::{ExecutionRequest, ExecutionResult, ExecutionStatus};
