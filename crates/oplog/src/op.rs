//! Operation descriptors recorded in the version log

use crate::frame::Value;
use crate::library::FunctionId;
use serde::{Deserialize, Serialize};

/// A named argument passed to a library function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub value: Value,
}

impl Argument {
    pub fn new<S: Into<String>>(name: S, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Look up an argument value by name
pub fn argument<'a>(args: &'a [Argument], name: &str) -> Option<&'a Value> {
    args.iter().find(|a| a.name == name).map(|a| &a.value)
}

/// Where the values written by an operation come from: a library function or
/// a constant. An operation holds exactly one of the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Producer {
    Function {
        function: FunctionId,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        parameters: Vec<Argument>,
    },
    Constant {
        value: Value,
    },
}

impl Producer {
    pub fn function(function: FunctionId, parameters: Vec<Argument>) -> Self {
        Producer::Function {
            function,
            parameters,
        }
    }

    pub fn constant(value: Value) -> Self {
        Producer::Constant { value }
    }
}

/// Update existing columns in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub columns: Vec<usize>,
    pub values: Producer,
    /// Input columns when they differ from the updated ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<usize>>,
}

/// Insert new columns computed from source columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertColumnOp {
    pub names: Vec<String>,
    pub values: Producer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<usize>>,
    /// Insert position; the new columns are appended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "optype", rename_all = "camelCase")]
pub enum Op {
    Load,
    Sample {
        n: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    Update(UpdateOp),
    InsertColumn(InsertColumnOp),
}

impl Op {
    pub fn update(columns: Vec<usize>, values: Producer) -> Self {
        Op::Update(UpdateOp {
            columns,
            values,
            sources: None,
        })
    }

    pub fn insert_column<S: Into<String>>(
        names: Vec<S>,
        sources: Vec<usize>,
        values: Producer,
    ) -> Self {
        Op::InsertColumn(InsertColumnOp {
            names: names.into_iter().map(Into::into).collect(),
            values,
            sources: Some(sources),
            position: None,
        })
    }

    /// Replace the source columns of an `Update` or `InsertColumn`
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<usize>) -> Self {
        match &mut self {
            Op::Update(u) => u.sources = Some(sources),
            Op::InsertColumn(i) => i.sources = Some(sources),
            Op::Load | Op::Sample { .. } => {}
        }
        self
    }

    /// Set the insert position of an `InsertColumn`
    #[must_use]
    pub fn at_position(mut self, position: usize) -> Self {
        if let Op::InsertColumn(i) = &mut self {
            i.position = Some(position);
        }
        self
    }

    /// Short name used in logs and error messages
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Op::Load => "load",
            Op::Sample { .. } => "sample",
            Op::Update(_) => "update",
            Op::InsertColumn(_) => "inscol",
        }
    }

    /// True for operations that only describe the dataset and never reach an
    /// execution engine
    #[must_use]
    pub fn is_informational(&self) -> bool {
        matches!(self, Op::Load | Op::Sample { .. })
    }

    /// Apply this operation's effect on the column names
    pub fn apply_schema(&self, columns: &mut Vec<String>) {
        if let Op::InsertColumn(insert) = self {
            let at = insert.position.unwrap_or(columns.len()).min(columns.len());
            columns.splice(at..at, insert.names.iter().cloned());
        }
    }
}
