//! Result Assembler - terminal state to `ExecutionResult`
//!
//! Pure mapping, no I/O:
//! - Completed: success iff the exit code is 0, stderr becomes `error`
//! - TimedOut: never successful, fixed error text, elapsed pinned to the
//!   timeout, no exit code
//!
//! A non-zero exit is the candidate's program failing, not the engine.

use crate::logs::DemuxedOutput;
use crucible_common::types::{ExecutionResult, ExecutionStatus, TIMEOUT_MESSAGE};
use std::time::Duration;

/// How the execution race ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited { exit_code: i64, elapsed: Duration },
    TimedOut { timeout: Duration },
}

pub fn assemble(termination: Termination, output: DemuxedOutput) -> ExecutionResult {
    match termination {
        Termination::Exited { exit_code, elapsed } => {
            let mut error = output.stderr;
            // Special handling for common signals
            if exit_code == 137 {
                error.push_str("\n[Container killed: likely OOM or exceeded memory limit]");
            } else if exit_code == 139 {
                error.push_str("\n[Container killed: segmentation fault]");
            }

            ExecutionResult {
                status: ExecutionStatus::Completed,
                success: exit_code == 0,
                output: output.stdout,
                error,
                exit_code: Some(exit_code),
                execution_time_ms: elapsed.as_millis() as u64,
                memory_used_bytes: 0,
                output_truncated: output.truncated,
            }
        }
        Termination::TimedOut { timeout } => ExecutionResult {
            status: ExecutionStatus::TimedOut,
            success: false,
            output: output.stdout,
            error: TIMEOUT_MESSAGE.to_string(),
            exit_code: None,
            execution_time_ms: timeout.as_millis() as u64,
            memory_used_bytes: 0,
            output_truncated: output.truncated,
        },
    }
}
