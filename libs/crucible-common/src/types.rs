use serde::{Deserialize, Serialize};

/// Safety limits to keep pathological submissions away from Docker
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Docker refuses memory limits below 6MB
pub const MIN_MEMORY_LIMIT_BYTES: u64 = 6 * 1024 * 1024;
/// Docker refuses NanoCpus below 0.01 CPUs, and reads 0 as "unlimited"
pub const MIN_CPU_QUOTA: f64 = 0.01;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CPU_QUOTA: f64 = 0.5;
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

/// Error text reported when the deadline wins the execution race
pub const TIMEOUT_MESSAGE: &str = "Execution timed out.";

/// One submission to run.
///
/// `language` stays a free-form string at this boundary so that an unknown
/// name reaches the engine and is rejected there, before any side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    #[serde(rename = "code")]
    pub source_code: String,
    pub language: String,
    #[serde(rename = "input", default)]
    pub stdin: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Fraction of one core, e.g. 0.5
    #[serde(default = "default_cpu_quota")]
    pub cpu_quota: f64,
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_cpu_quota() -> f64 {
    DEFAULT_CPU_QUOTA
}

fn default_memory_limit_bytes() -> u64 {
    DEFAULT_MEMORY_LIMIT_BYTES
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            language: language.into(),
            stdin: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cpu_quota: DEFAULT_CPU_QUOTA,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_cpu_quota(mut self, cpu_quota: f64) -> Self {
        self.cpu_quota = cpu_quota;
        self
    }

    pub fn with_memory_limit_bytes(mut self, memory_limit_bytes: u64) -> Self {
        self.memory_limit_bytes = memory_limit_bytes;
        self
    }

    /// Check the request invariants. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeoutMs must be greater than zero".to_string());
        }
        if self.memory_limit_bytes == 0 {
            return Err("memoryLimitBytes must be greater than zero".to_string());
        }
        if self.memory_limit_bytes < MIN_MEMORY_LIMIT_BYTES {
            return Err(format!(
                "memoryLimitBytes must be at least {} bytes",
                MIN_MEMORY_LIMIT_BYTES
            ));
        }
        if i64::try_from(self.memory_limit_bytes).is_err() {
            return Err("memoryLimitBytes is too large".to_string());
        }
        if !self.cpu_quota.is_finite() || self.cpu_quota < MIN_CPU_QUOTA {
            return Err(format!("cpuQuota must be at least {} of a core", MIN_CPU_QUOTA));
        }
        if self.source_code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(format!(
                "source code exceeds maximum size of {} bytes",
                MAX_SOURCE_CODE_BYTES
            ));
        }
        if self.stdin.len() > MAX_STDIN_BYTES {
            return Err(format!(
                "input exceeds maximum size of {} bytes",
                MAX_STDIN_BYTES
            ));
        }
        Ok(())
    }

    /// CPU quota in Docker's NanoCpus unit
    pub fn nano_cpus(&self) -> i64 {
        (self.cpu_quota * 1_000_000_000.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The program exited on its own; see `exit_code`
    Completed,
    /// The deadline won and the container was killed
    TimedOut,
}

/// Structured outcome of one execution. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub success: bool,
    /// Captured stdout
    pub output: String,
    /// Captured stderr, or the timeout message
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    pub execution_time_ms: u64,
    /// Best-effort; always zero for now
    pub memory_used_bytes: u64,
    #[serde(default)]
    pub output_truncated: bool,
}

impl ExecutionResult {
    pub fn timed_out(&self) -> bool {
        self.status == ExecutionStatus::TimedOut
    }
}
