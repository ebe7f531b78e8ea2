//! Sample view: the dataset as of a chosen version, derived by replaying the
//! version log over the originally loaded sample.

use crate::engine::ExecutionEngine;
use crate::error::{OpLogError, Result};
use crate::frame::{Frame, Row};
use crate::log::{ProvenanceEntry, VersionId, VersionLog};
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Row window of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    offset: usize,
    limit: usize,
}

impl Window {
    pub const DEFAULT_LIMIT: usize = 10;

    /// Offset must be non-negative and limit positive
    pub fn new(offset: i64, limit: i64) -> Result<Self> {
        if limit <= 0 {
            return Err(OpLogError::invalid_argument(format!(
                "limit must be positive, got {limit}"
            )));
        }
        let offset = usize::try_from(offset).map_err(|_| {
            OpLogError::invalid_argument(format!("offset must not be negative, got {offset}"))
        })?;
        let limit = usize::try_from(limit)
            .map_err(|_| OpLogError::invalid_argument(format!("limit {limit} is too large")))?;
        Ok(Self { offset, limit })
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Rows of one window of the dataset at a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleState {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub offset: usize,
    pub row_count: usize,
    /// Requested version; `None` means the tail of the log
    pub version: Option<VersionId>,
}

impl SampleState {
    #[must_use]
    pub fn from_frame(frame: &Frame, window: Window, version: Option<VersionId>) -> Self {
        Self {
            columns: frame.columns.clone(),
            rows: frame.window(window.offset, window.limit).to_vec(),
            offset: window.offset,
            row_count: frame.row_count(),
            version,
        }
    }
}

/// Replay `entries` over `base`. Informational entries are skipped; every
/// other entry goes to the engine in log order.
pub async fn replay(
    base: &Frame,
    entries: &[ProvenanceEntry],
    engine: &dyn ExecutionEngine,
) -> Result<Frame> {
    let mut frame = base.clone();
    for entry in entries {
        if entry.op.is_informational() {
            continue;
        }
        frame = engine
            .apply(&entry.op, &frame)
            .await
            .map_err(|source| OpLogError::EngineExecution {
                version: entry.id,
                source,
            })?;
    }
    Ok(frame)
}

struct CachedReplay {
    tail: VersionId,
    frame: Arc<Frame>,
}

pub struct SampleView {
    base: Frame,
    cache: Mutex<Option<CachedReplay>>,
}

impl SampleView {
    pub fn new(base: Frame) -> Self {
        Self {
            base,
            cache: Mutex::new(None),
        }
    }

    /// The sample as loaded, before any operation
    #[must_use]
    pub fn base(&self) -> &Frame {
        &self.base
    }

    fn cache(&self) -> MutexGuard<'_, Option<CachedReplay>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the cached tail replay. Called after every log mutation.
    pub fn invalidate(&self) {
        *self.cache() = None;
    }

    /// Install `frame` as the replay of a new tail. The caller guarantees the
    /// frame is what replaying the log through `tail` would produce.
    pub fn prime(&self, tail: VersionId, frame: Arc<Frame>) {
        *self.cache() = Some(CachedReplay { tail, frame });
    }

    /// Full frame at `version` (tail when absent).
    ///
    /// Only the tail is cached; historical versions are replayed on demand.
    pub async fn materialize(
        &self,
        log: &VersionLog,
        version: Option<VersionId>,
        engine: &dyn ExecutionEngine,
    ) -> Result<Arc<Frame>> {
        let id = log.resolve(version)?;
        let is_tail = id == log.tail();
        if is_tail {
            let hit = self
                .cache()
                .as_ref()
                .filter(|c| c.tail == id)
                .map(|c| Arc::clone(&c.frame));
            if let Some(frame) = hit {
                debug!("replay cache hit for version {version}", version: id.0);
                return Ok(frame);
            }
        }

        let entries = log.entries_up_to(Some(id))?;
        debug!("replaying {count} entries up to version {version}",
               count: entries.len(), version: id.0);
        let frame = Arc::new(replay(&self.base, entries, engine).await?);

        if is_tail {
            *self.cache() = Some(CachedReplay {
                tail: id,
                frame: Arc::clone(&frame),
            });
        }
        Ok(frame)
    }

    /// Rows `window` of the dataset at `version`
    pub async fn render(
        &self,
        log: &VersionLog,
        version: Option<VersionId>,
        window: Window,
        engine: &dyn ExecutionEngine,
    ) -> Result<SampleState> {
        let frame = self.materialize(log, version, engine).await?;
        Ok(SampleState::from_frame(&frame, window, version))
    }

    /// True if a tail replay is cached
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache().is_some()
    }
}
