//! Steward - dataset sessions and the commit coordinator
//!
//! The steward owns one [`DatasetSession`] per loaded dataset. A session
//! guards the version log of its sample, renders sample windows, and hands the
//! pending entries to the [`CommitCoordinator`] when the user commits. The
//! [`Engine`] routes JSON requests to sessions by dataset reference.

use oplog::{EngineError, OpLogError, VersionId};
use thiserror::Error;

mod api;
mod coordinator;
mod engine;
mod sample;
mod session;

pub use api::{
    Action, DatasetRef, Failure, Fetch, InsertPayload, Metadata, Request, RequestResult,
    Response, UpdatePayload, ValueSpec,
};
pub use coordinator::CommitCoordinator;
pub use engine::Engine;
pub use sample::sample_rows;
pub use session::{DatasetSession, Mutation};

#[derive(Debug, Error)]
pub enum StewardError {
    #[error(transparent)]
    Log(#[from] OpLogError),

    #[error("Commit failed at version {at_operation}: {cause}")]
    CommitFailed {
        at_operation: VersionId,
        /// Versions applied to the full dataset before the failure
        applied: Vec<VersionId>,
        #[source]
        cause: EngineError,
    },

    #[error("Unknown dataset '{name}' in engine {engine}")]
    UnknownDataset { engine: String, name: String },

    #[error("Unknown engine {0}")]
    UnknownEngine(String),

    #[error("Dataset '{0}' already exists")]
    DatasetExists(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StewardError {
    /// Wire tag for this error in a failure response
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StewardError::Log(e) => e.kind(),
            StewardError::CommitFailed { .. } => "commitFailed",
            StewardError::UnknownDataset { .. } => "unknownDataset",
            StewardError::UnknownEngine(_) => "unknownEngine",
            StewardError::DatasetExists(_) => "datasetExists",
            StewardError::InvalidRequest(_) | StewardError::Json(_) => "invalidRequest",
        }
    }
}

pub type Result<T> = std::result::Result<T, StewardError>;
