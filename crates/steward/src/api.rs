//! Request and response documents exchanged with clients

use crate::StewardError;
use oplog::{
    Argument, FunctionDescriptor, FunctionId, InsertColumnOp, Op, OpLogError, Producer, Profile,
    ProvenanceEntry, SampleState, UpdateOp, Value, VersionId,
};
use serde::{Deserialize, Deserializer, Serialize, de};

/// Names a dataset within an engine instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    #[serde(alias = "engine")]
    pub database: String,
    pub name: String,
}

impl DatasetRef {
    pub fn new<E: Into<String>, N: Into<String>>(database: E, name: N) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub dataset: DatasetRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default)]
    pub fetch: Fetch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fetch {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub version: Option<VersionId>,
    #[serde(default)]
    pub include_library: bool,
    /// Defaults to true for requests that carry an action
    pub include_metadata: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Action {
    Update(UpdatePayload),
    #[serde(rename = "inscol")]
    InsertColumn(InsertPayload),
    Rollback(VersionId),
    Commit,
}

/// Either a function reference (an object with a `name`) or a constant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Function(FunctionId),
    Constant(Value),
}

impl<'de> Deserialize<'de> for ValueSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.as_object().is_some_and(|o| o.contains_key("name")) {
            serde_json::from_value(value)
                .map(ValueSpec::Function)
                .map_err(de::Error::custom)
        } else {
            Ok(ValueSpec::Constant(value))
        }
    }
}

impl ValueSpec {
    fn into_producer(self, parameters: Vec<Argument>) -> Result<Producer, OpLogError> {
        match self {
            ValueSpec::Function(function) => Ok(Producer::function(function, parameters)),
            ValueSpec::Constant(_) if !parameters.is_empty() => Err(
                OpLogError::invalid_operation("constant values do not take parameters"),
            ),
            ValueSpec::Constant(value) => Ok(Producer::constant(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub columns: Vec<i64>,
    pub func: ValueSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<i64>>,
    #[serde(default, alias = "args", skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertPayload {
    pub names: Vec<String>,
    pub values: ValueSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<i64>>,
    #[serde(default, alias = "args", skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Argument>,
    #[serde(default, alias = "position", skip_serializing_if = "Option::is_none")]
    pub pos: Option<i64>,
}

fn indices(what: &str, refs: &[i64]) -> Result<Vec<usize>, OpLogError> {
    refs.iter()
        .map(|&r| {
            usize::try_from(r).map_err(|_| {
                OpLogError::invalid_operation(format!("{what} column {r} out of range"))
            })
        })
        .collect()
}

impl TryFrom<UpdatePayload> for Op {
    type Error = OpLogError;

    fn try_from(payload: UpdatePayload) -> Result<Self, OpLogError> {
        Ok(Op::Update(UpdateOp {
            columns: indices("target", &payload.columns)?,
            sources: payload
                .sources
                .as_deref()
                .map(|s| indices("source", s))
                .transpose()?,
            values: payload.func.into_producer(payload.parameters)?,
        }))
    }
}

impl TryFrom<InsertPayload> for Op {
    type Error = OpLogError;

    fn try_from(payload: InsertPayload) -> Result<Self, OpLogError> {
        let position = payload
            .pos
            .map(|p| {
                usize::try_from(p).map_err(|_| {
                    OpLogError::invalid_operation(format!("insert position {p} out of range"))
                })
            })
            .transpose()?;
        Ok(Op::InsertColumn(InsertColumnOp {
            names: payload.names,
            sources: payload
                .sources
                .as_deref()
                .map(|s| indices("source", s))
                .transpose()?,
            values: payload.values.into_producer(payload.parameters)?,
            position,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub profiling: Profile,
    pub log: Vec<ProvenanceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    pub dataset: DatasetRef,
    #[serde(flatten)]
    pub state: SampleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<Vec<FunctionDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    pub message: String,
}

impl From<&StewardError> for Failure {
    fn from(e: &StewardError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Ok(Box<RequestResult>),
    Error(Failure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_update_request() {
        let request: Request = serde_json::from_value(json!({
            "dataset": {"database": "e1", "name": "ds"},
            "action": {"type": "update", "payload": {
                "columns": [0],
                "func": {"name": "upper"},
                "args": [{"name": "x", "value": 1}]
            }},
            "fetch": {"offset": 0, "limit": 5}
        }))
        .expect("parses");
        let Some(Action::Update(payload)) = request.action else {
            panic!("expected update action");
        };
        assert_eq!(payload.func, ValueSpec::Function(FunctionId::bare("upper")));
        assert_eq!(payload.parameters, vec![Argument::new("x", json!(1))]);
        assert_eq!(request.fetch.limit, Some(5));
        assert_eq!(request.fetch.include_metadata, None);
    }

    #[test]
    fn test_parse_other_actions() {
        let rollback: Action =
            serde_json::from_value(json!({"type": "rollback", "payload": 3})).expect("parses");
        assert_eq!(rollback, Action::Rollback(VersionId(3)));

        let commit: Action = serde_json::from_value(json!({"type": "commit"})).expect("parses");
        assert_eq!(commit, Action::Commit);

        let insert: Action = serde_json::from_value(json!({"type": "inscol", "payload": {
            "names": ["flag"], "values": true, "position": 1
        }}))
        .expect("parses");
        let Action::InsertColumn(payload) = insert else {
            panic!("expected insert action");
        };
        assert_eq!(payload.values, ValueSpec::Constant(json!(true)));
        assert_eq!(payload.pos, Some(1));

        let spread: ValueSpec = serde_json::from_value(json!(["a", "b"])).expect("parses");
        assert_eq!(spread, ValueSpec::Constant(json!(["a", "b"])));
    }

    #[test]
    fn test_engine_alias_and_default_fetch() {
        let request: Request = serde_json::from_value(json!({
            "dataset": {"engine": "e1", "name": "ds"}
        }))
        .expect("parses");
        assert_eq!(request.dataset, DatasetRef::new("e1", "ds"));
        assert_eq!(request.fetch, Fetch::default());
    }

    #[test]
    fn test_payload_conversion_checks_indices() {
        let payload = UpdatePayload {
            columns: vec![-1],
            func: ValueSpec::Constant(json!(0)),
            sources: None,
            parameters: vec![],
        };
        assert!(matches!(Op::try_from(payload), Err(OpLogError::InvalidOperation(_))));

        let payload = InsertPayload {
            names: vec!["x".into()],
            values: ValueSpec::Constant(json!(0)),
            sources: None,
            parameters: vec![Argument::new("p", json!(1))],
            pos: None,
        };
        assert!(Op::try_from(payload).is_err());
    }

    #[test]
    fn test_failure_response_shape() {
        let error = StewardError::Log(OpLogError::NothingToCommit);
        let doc = serde_json::to_value(Response::Error(Failure::from(&error))).expect("serializes");
        assert_eq!(
            doc,
            json!({"status": "error", "kind": "nothingToCommit", "message": "Nothing to commit"})
        );
    }
}
