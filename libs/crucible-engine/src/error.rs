use crucible_common::UnsupportedLanguage;
use std::fmt;
use thiserror::Error;

/// Container runtime calls, named in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeOperation {
    Connect,
    ListImages,
    PullImage,
    Create,
    Attach,
    Start,
    Wait,
    Kill,
    Remove,
}

impl fmt::Display for RuntimeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeOperation::Connect => "connect",
            RuntimeOperation::ListImages => "image list",
            RuntimeOperation::PullImage => "image pull",
            RuntimeOperation::Create => "container create",
            RuntimeOperation::Attach => "container attach",
            RuntimeOperation::Start => "container start",
            RuntimeOperation::Wait => "container wait",
            RuntimeOperation::Kill => "container kill",
            RuntimeOperation::Remove => "container remove",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{operation} failed: {source}")]
    Docker {
        operation: RuntimeOperation,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("{operation} failed: {message}")]
    Rejected {
        operation: RuntimeOperation,
        message: String,
    },
}

impl RuntimeError {
    pub fn docker(operation: RuntimeOperation, source: bollard::errors::Error) -> Self {
        RuntimeError::Docker { operation, source }
    }

    pub fn rejected(operation: RuntimeOperation, message: impl Into<String>) -> Self {
        RuntimeError::Rejected {
            operation,
            message: message.into(),
        }
    }

    pub fn operation(&self) -> RuntimeOperation {
        match self {
            RuntimeError::Docker { operation, .. } | RuntimeError::Rejected { operation, .. } => {
                *operation
            }
        }
    }

    /// The container is already gone (auto-removed or never existed)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RuntimeError::Docker {
                source: bollard::errors::Error::DockerResponseServerError { status_code: 404, .. },
                ..
            }
        )
    }
}

/// Failures of a single execution.
///
/// A timeout or a non-zero exit is not an error: both come back as an
/// `ExecutionResult`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("image '{image}' is unavailable: {source}")]
    ImageUnavailable {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("container runtime failure: {0}")]
    RuntimeOperationFailed(#[from] RuntimeError),
    #[error("workspace failure: {0}")]
    Workspace(#[source] std::io::Error),
}

impl ExecutionError {
    /// Caused by the request itself rather than the infrastructure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::UnsupportedLanguage(_) | ExecutionError::InvalidRequest(_)
        )
    }

    /// Message safe to hand back to an untrusted caller
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "Internal server error during code execution.".to_string()
        }
    }
}
