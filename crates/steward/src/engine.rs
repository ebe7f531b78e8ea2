//! Engine instance: a function library, an execution engine and the dataset
//! sessions opened against them.

use crate::api::{Action, DatasetRef, Failure, Metadata, Request, RequestResult, Response};
use crate::session::{DatasetSession, Mutation};
use crate::{Result, StewardError};
use diagnostics::*;
use oplog::{ExecutionEngine, Frame, FunctionRegistry, Op, VersionId, Window};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Engine {
    id: String,
    library: Arc<dyn FunctionRegistry>,
    executor: Arc<dyn ExecutionEngine>,
    datasets: RwLock<HashMap<String, Arc<DatasetSession>>>,
    default_limit: i64,
}

impl Engine {
    /// Create an engine with a fresh UUID v7 identifier
    pub fn new(library: Arc<dyn FunctionRegistry>, executor: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            id: uuid7::uuid7().to_string(),
            library,
            executor,
            datasets: RwLock::new(HashMap::new()),
            default_limit: Window::DEFAULT_LIMIT as i64,
        }
    }

    #[must_use]
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    /// Row limit used when a fetch does not name one
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn library(&self) -> &dyn FunctionRegistry {
        self.library.as_ref()
    }

    #[must_use]
    pub fn reference(&self, name: &str) -> DatasetRef {
        DatasetRef::new(self.id.as_str(), name)
    }

    async fn register(&self, session: DatasetSession) -> Result<Arc<DatasetSession>> {
        let mut datasets = self.datasets.write().await;
        if datasets.contains_key(session.name()) {
            return Err(StewardError::DatasetExists(session.name().to_string()));
        }
        let session = Arc::new(session);
        datasets.insert(session.name().to_string(), Arc::clone(&session));
        info!("engine {engine} opened dataset {name}",
              engine: self.id.as_str(), name: session.name());
        Ok(session)
    }

    /// Open `frame` as a dataset whose sample is the whole frame
    pub async fn load(&self, name: &str, frame: Frame) -> Result<Arc<DatasetSession>> {
        if self.datasets.read().await.contains_key(name) {
            return Err(StewardError::DatasetExists(name.to_string()));
        }
        let session = DatasetSession::open(
            name,
            frame,
            Arc::clone(&self.executor),
            Arc::clone(&self.library),
        );
        self.register(session).await
    }

    /// Open a random sample of `n` rows of `full` as a dataset. Commits
    /// apply to `full`.
    pub async fn sample(
        &self,
        name: &str,
        full: Frame,
        n: usize,
        seed: Option<u64>,
    ) -> Result<Arc<DatasetSession>> {
        if self.datasets.read().await.contains_key(name) {
            return Err(StewardError::DatasetExists(name.to_string()));
        }
        let session = DatasetSession::open_sample(
            name,
            full,
            n,
            seed,
            Arc::clone(&self.executor),
            Arc::clone(&self.library),
        );
        self.register(session).await
    }

    pub async fn dataset(&self, name: &str) -> Result<Arc<DatasetSession>> {
        self.datasets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StewardError::UnknownDataset {
                engine: self.id.clone(),
                name: name.to_string(),
            })
    }

    /// Names of the open datasets, sorted
    pub async fn datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.datasets.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Serve one request. Failures are reported in the response.
    pub async fn handle(&self, request: Request) -> Response {
        match self.execute(request).await {
            Ok(result) => Response::Ok(Box::new(result)),
            Err(e) => {
                let failure = Failure::from(&e);
                warn!("request failed ({kind}): {message}",
                      kind: failure.kind.as_str(), message: failure.message.as_str());
                Response::Error(failure)
            }
        }
    }

    /// Serve one request given as a JSON document and return the JSON
    /// response. A document that does not parse yields an `invalidRequest`
    /// failure.
    pub async fn handle_json(&self, document: &str) -> Result<String> {
        let response = match serde_json::from_str::<Request>(document) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::Error(Failure::from(&StewardError::InvalidRequest(e.to_string()))),
        };
        Ok(serde_json::to_string(&response)?)
    }

    async fn execute(&self, request: Request) -> Result<RequestResult> {
        if request.dataset.database != self.id {
            return Err(StewardError::UnknownEngine(request.dataset.database));
        }
        let session = self.dataset(&request.dataset.name).await?;
        let fetch = request.fetch;
        let window = Window::new(
            fetch.offset.unwrap_or(0),
            fetch.limit.unwrap_or(self.default_limit),
        )?;

        let has_action = request.action.is_some();
        if let Some(action) = request.action {
            perform(&session, action, fetch.version).await?;
        }

        let state = session.render(fetch.version, window).await?;
        let metadata = if fetch.include_metadata.unwrap_or(has_action) {
            let profiling = session.profile(fetch.version).await?;
            Some(Metadata {
                profiling: profiling.as_ref().clone(),
                log: session.log().await.entries().to_vec(),
            })
        } else {
            None
        };
        let library = fetch.include_library.then(|| self.library.functions());

        Ok(RequestResult {
            dataset: request.dataset,
            state,
            library,
            metadata,
        })
    }
}

async fn perform(
    session: &DatasetSession,
    action: Action,
    fetch: Option<VersionId>,
) -> Result<()> {
    let mutation = match action {
        Action::Update(payload) => Mutation::Apply(Op::try_from(payload)?),
        Action::InsertColumn(payload) => Mutation::Apply(Op::try_from(payload)?),
        Action::Rollback(target) => Mutation::Rollback(target),
        Action::Commit => Mutation::Commit,
    };
    session.mutate(mutation, fetch).await
}
