// Engine configuration, read from the environment

use std::path::PathBuf;
use thiserror::Error;

pub const ENV_DOCKER_ENDPOINT: &str = "CRUCIBLE_DOCKER_ENDPOINT";
pub const ENV_DOCKER_TIMEOUT_SECS: &str = "CRUCIBLE_DOCKER_TIMEOUT_SECS";
pub const ENV_WORKSPACE_ROOT: &str = "CRUCIBLE_WORKSPACE_ROOT";
pub const ENV_MAX_OUTPUT_BYTES: &str = "CRUCIBLE_MAX_OUTPUT_BYTES";

const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// `unix://`, `tcp://` or `http://` address; `None` uses the local defaults
    pub docker_endpoint: Option<String>,
    /// Timeout for individual runtime API calls, not for the submitted code
    pub docker_timeout_secs: u64,
    /// Parent directory for workspaces. Must be visible to the Docker daemon.
    pub workspace_root: PathBuf,
    /// Per-channel cap on captured stdout/stderr
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            docker_endpoint: None,
            docker_timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
            workspace_root: std::env::temp_dir(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENV_DOCKER_ENDPOINT) {
            let endpoint = endpoint.trim();
            if endpoint.is_empty() {
                return Err(ConfigError::Empty { name: ENV_DOCKER_ENDPOINT });
            }
            config.docker_endpoint = Some(endpoint.to_string());
        }

        if let Some(value) = lookup(ENV_DOCKER_TIMEOUT_SECS) {
            config.docker_timeout_secs = parse_positive(ENV_DOCKER_TIMEOUT_SECS, &value)?;
        }

        if let Some(root) = lookup(ENV_WORKSPACE_ROOT) {
            if root.trim().is_empty() {
                return Err(ConfigError::Empty { name: ENV_WORKSPACE_ROOT });
            }
            config.workspace_root = PathBuf::from(root);
        }

        if let Some(value) = lookup(ENV_MAX_OUTPUT_BYTES) {
            let max = parse_positive(ENV_MAX_OUTPUT_BYTES, &value)?;
            config.max_output_bytes = usize::try_from(max).map_err(|_| ConfigError::InvalidNumber {
                name: ENV_MAX_OUTPUT_BYTES,
                value: value.clone(),
            })?;
        }

        Ok(config)
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}
