// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Dataset session - the version log of one dataset and everything derived
//! from it.
//!
//! Mutations (apply, rollback, commit) hold the log's write lock for their
//! whole duration, so they are serialized. Renders hold the read lock and
//! may run concurrently with each other.

use crate::coordinator::CommitCoordinator;
use crate::sample::sample_rows;
use crate::{Result, StewardError};
use diagnostics::*;
use oplog::{
    ExecutionEngine, Frame, FunctionRegistry, Op, OpLogError, Profile, ProvenanceEntry,
    SampleState, SampleView, VersionId, VersionLog, Window, profile,
};
use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::{Mutex, RwLock};

/// A change to the version log
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Apply(Op),
    Rollback(VersionId),
    Commit,
}

pub struct DatasetSession {
    name: String,
    log: RwLock<VersionLog>,
    view: SampleView,
    coordinator: Mutex<CommitCoordinator>,
    profiles: std::sync::Mutex<HashMap<VersionId, Arc<Profile>>>,
    engine: Arc<dyn ExecutionEngine>,
    library: Arc<dyn FunctionRegistry>,
}

impl DatasetSession {
    /// Open a session whose sample is the whole dataset
    pub fn open<S: Into<String>>(
        name: S,
        frame: Frame,
        engine: Arc<dyn ExecutionEngine>,
        library: Arc<dyn FunctionRegistry>,
    ) -> Self {
        Self::with_log(name.into(), frame.clone(), frame, VersionLog::new(), engine, library)
    }

    /// Open a session that edits a random sample of `n` rows of `full`
    pub fn open_sample<S: Into<String>>(
        name: S,
        full: Frame,
        n: usize,
        seed: Option<u64>,
        engine: Arc<dyn ExecutionEngine>,
        library: Arc<dyn FunctionRegistry>,
    ) -> Self {
        let name = name.into();
        let sample = sample_rows(&full, n, seed);
        info!("sampled {sampled} of {total} rows for dataset {name}",
              sampled: sample.row_count(), total: full.row_count(), name: name.as_str());
        let log = VersionLog::sampled(sample.row_count(), seed);
        Self::with_log(name, sample, full, log, engine, library)
    }

    fn with_log(
        name: String,
        sample: Frame,
        full: Frame,
        log: VersionLog,
        engine: Arc<dyn ExecutionEngine>,
        library: Arc<dyn FunctionRegistry>,
    ) -> Self {
        Self {
            name,
            log: RwLock::new(log),
            view: SampleView::new(sample),
            coordinator: Mutex::new(CommitCoordinator::new(full, Arc::clone(&engine))),
            profiles: std::sync::Mutex::new(HashMap::new()),
            engine,
            library,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the version log
    pub async fn log(&self) -> VersionLog {
        self.log.read().await.clone()
    }

    fn profiles(&self) -> MutexGuard<'_, HashMap<VersionId, Arc<Profile>>> {
        self.profiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rows `window` of the sample at `version` (tail when absent)
    pub async fn render(&self, version: Option<VersionId>, window: Window) -> Result<SampleState> {
        let log = self.log.read().await;
        Ok(self
            .view
            .render(&log, version, window, self.engine.as_ref())
            .await?)
    }

    /// Profile of the whole sample at `version`, cached per version
    pub async fn profile(&self, version: Option<VersionId>) -> Result<Arc<Profile>> {
        let log = self.log.read().await;
        let id = log.resolve(version)?;
        let cached = self.profiles().get(&id).cloned();
        if let Some(profile) = cached {
            return Ok(profile);
        }
        let frame = self
            .view
            .materialize(&log, Some(id), self.engine.as_ref())
            .await?;
        let computed = Arc::new(profile(&frame, id));
        self.profiles().insert(id, Arc::clone(&computed));
        debug!("profiled version {version} of {name}", version: id.0, name: self.name.as_str());
        Ok(computed)
    }

    /// Validate `op`, compute it on the sample and append it to the log.
    ///
    /// The log is only changed when the engine succeeds.
    pub async fn apply(&self, op: Op) -> Result<VersionId> {
        let mut log = self.log.write().await;
        self.apply_locked(&mut log, op, None).await
    }

    /// Discard every entry after `target`
    pub async fn rollback(&self, target: VersionId) -> Result<Vec<ProvenanceEntry>> {
        let mut log = self.log.write().await;
        self.rollback_locked(&mut log, target, None)
    }

    /// Apply the pending entries to the full dataset and seal them.
    ///
    /// When the full dataset rejects an entry, the entries applied before it
    /// are sealed and the rest stay pending.
    pub async fn commit(&self) -> Result<Vec<ProvenanceEntry>> {
        let mut log = self.log.write().await;
        self.commit_locked(&mut log, None).await
    }

    /// Run `mutation` unless `fetch` names a version that would not exist
    /// once it is done. A refused mutation leaves the log unchanged.
    pub async fn mutate(&self, mutation: Mutation, fetch: Option<VersionId>) -> Result<()> {
        let mut log = self.log.write().await;
        match mutation {
            Mutation::Apply(op) => {
                self.apply_locked(&mut log, op, fetch).await?;
            }
            Mutation::Rollback(target) => {
                self.rollback_locked(&mut log, target, fetch)?;
            }
            Mutation::Commit => {
                self.commit_locked(&mut log, fetch).await?;
            }
        }
        Ok(())
    }

    async fn apply_locked(
        &self,
        log: &mut VersionLog,
        op: Op,
        fetch: Option<VersionId>,
    ) -> Result<VersionId> {
        let mut candidate = log.clone();
        let id = candidate.append(op, self.library.as_ref(), &self.view.base().columns)?;
        candidate.resolve(fetch)?;
        let entry = candidate
            .get(id)
            .ok_or_else(|| OpLogError::invalid_version(id, "appended entry is missing"))?;

        let current = self
            .view
            .materialize(log, None, self.engine.as_ref())
            .await?;
        let frame = match self.engine.apply(&entry.op, &current).await {
            Ok(frame) => frame,
            Err(source) => {
                let message = source.to_string();
                warn!("rejected {op} on {name}: {message}",
                      op: entry.op.name(), name: self.name.as_str(), message: message.as_str());
                return Err(OpLogError::EngineExecution {
                    version: id,
                    source,
                }
                .into());
            }
        };

        *log = candidate;
        self.view.prime(id, Arc::new(frame));
        Ok(id)
    }

    fn rollback_locked(
        &self,
        log: &mut VersionLog,
        target: VersionId,
        fetch: Option<VersionId>,
    ) -> Result<Vec<ProvenanceEntry>> {
        let mut candidate = log.clone();
        let removed = candidate.rollback(target)?;
        candidate.resolve(fetch)?;
        *log = candidate;
        if !removed.is_empty() {
            self.view.invalidate();
            self.profiles().retain(|id, _| *id <= target);
        }
        Ok(removed)
    }

    async fn commit_locked(
        &self,
        log: &mut VersionLog,
        fetch: Option<VersionId>,
    ) -> Result<Vec<ProvenanceEntry>> {
        // Sealing removes no entries.
        log.resolve(fetch)?;
        let pending = log.uncommitted().to_vec();
        if pending.is_empty() {
            return Err(OpLogError::NothingToCommit.into());
        }
        let mut coordinator = self.coordinator.lock().await;
        let outcome = coordinator.commit_to_full_dataset(&pending).await;
        self.view.invalidate();
        match outcome {
            Ok(_) => Ok(log.commit()?),
            Err(StewardError::CommitFailed {
                at_operation,
                applied,
                cause,
            }) => {
                if let Some(last) = applied.last() {
                    log.commit_through(*last)?;
                }
                Err(StewardError::CommitFailed {
                    at_operation,
                    applied,
                    cause,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Copy of the full dataset with every committed entry applied
    pub async fn full_dataset(&self) -> Frame {
        self.coordinator.lock().await.full_dataset().clone()
    }
}
