//! Boundary to the execution engine that computes operations on a frame.

use crate::frame::Frame;
use crate::op::Op;
use async_trait::async_trait;

/// Failure reported by an execution engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Computes the effect of one operation.
///
/// The same engine serves replays against the sample and commits against the
/// full dataset; it never sees the version log. Implementations must be
/// deterministic for a given (op, input) pair so that replays are
/// reproducible.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn apply(&self, op: &Op, input: &Frame) -> Result<Frame, EngineError>;
}
