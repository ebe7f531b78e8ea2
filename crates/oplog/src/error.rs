// Error types for operation log, sample view and function library
use crate::engine::EngineError;
use crate::log::VersionId;

pub type Result<T> = std::result::Result<T, OpLogError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpLogError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid version {version}: {reason}")]
    InvalidVersion { version: VersionId, reason: String },

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Engine failed to execute version {version}: {source}")]
    EngineExecution {
        version: VersionId,
        #[source]
        source: EngineError,
    },
}

impl OpLogError {
    pub fn invalid_operation<S: Into<String>>(reason: S) -> Self {
        OpLogError::InvalidOperation(reason.into())
    }

    pub fn invalid_version<S: Into<String>>(version: VersionId, reason: S) -> Self {
        OpLogError::InvalidVersion {
            version,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(reason: S) -> Self {
        OpLogError::InvalidArgument(reason.into())
    }

    /// Wire tag for this error in a failure response.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OpLogError::InvalidOperation(_) => "invalidOperation",
            OpLogError::InvalidVersion { .. } => "invalidVersion",
            OpLogError::NothingToCommit => "nothingToCommit",
            OpLogError::InvalidArgument(_) => "invalidArgument",
            OpLogError::EngineExecution { .. } => "engineExecution",
        }
    }
}
