// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Commit coordinator - applies committed log entries to the full dataset

use crate::StewardError;
use diagnostics::*;
use oplog::{ExecutionEngine, Frame, ProvenanceEntry, VersionId};
use std::sync::Arc;

/// Holds the full dataset and applies pending operations to it, in log
/// order, when the session commits.
///
/// The full dataset only ever moves forward: an operation that was applied
/// stays applied, even when a later one in the same batch fails.
pub struct CommitCoordinator {
    full: Frame,
    applied: Vec<VersionId>,
    engine: Arc<dyn ExecutionEngine>,
}

impl CommitCoordinator {
    pub fn new(full: Frame, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            full,
            applied: Vec::new(),
            engine,
        }
    }

    /// The full dataset with every committed operation applied
    #[must_use]
    pub fn full_dataset(&self) -> &Frame {
        &self.full
    }

    /// Versions applied to the full dataset, in application order
    #[must_use]
    pub fn applied(&self) -> &[VersionId] {
        &self.applied
    }

    /// Apply `entries` to the full dataset in order.
    ///
    /// Returns the versions applied by this call. On the first engine failure
    /// the remaining entries are not attempted and the error lists the
    /// versions that were applied before it.
    pub async fn commit_to_full_dataset(
        &mut self,
        entries: &[ProvenanceEntry],
    ) -> Result<Vec<VersionId>, StewardError> {
        let mut applied = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.op.is_informational() {
                continue;
            }
            debug!("applying version {version} ({op}) to {rows} rows of the full dataset",
                   version: entry.id.0, op: entry.op.name(), rows: self.full.row_count());
            match self.engine.apply(&entry.op, &self.full).await {
                Ok(frame) => {
                    self.full = frame;
                    self.applied.push(entry.id);
                    applied.push(entry.id);
                }
                Err(cause) => {
                    let message = cause.to_string();
                    error!("commit failed at version {version}: {message}",
                           version: entry.id.0, message: message.as_str());
                    return Err(StewardError::CommitFailed {
                        at_operation: entry.id,
                        applied,
                        cause,
                    });
                }
            }
        }
        info!("applied {count} operations to the full dataset", count: applied.len());
        Ok(applied)
    }
}
