//! Column profiling for the metadata section of a response

use crate::frame::{Frame, Value};
use crate::log::VersionId;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralType {
    Empty,
    Boolean,
    Integer,
    Float,
    Text,
    Mixed,
}

impl StructuralType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Float),
            Value::String(s) if s.is_empty() => None,
            Value::String(_) => Some(Self::Text),
            Value::Array(_) | Value::Object(_) => Some(Self::Mixed),
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, t) | (t, Self::Empty) => t,
            (a, b) if a == b => a,
            (Self::Integer, Self::Float) | (Self::Float, Self::Integer) => Self::Float,
            _ => Self::Mixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub structural_type: StructuralType,
    pub distinct_values: usize,
    pub missing_values: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Version the profile was computed for
    pub id: VersionId,
    pub nb_rows: usize,
    pub nb_profiled_rows: usize,
    /// RFC 3339 time the profile was computed
    pub date: String,
    pub columns: Vec<ColumnProfile>,
    /// Distinct structural types over all columns
    pub types: Vec<StructuralType>,
}

/// Profile every column of `frame`. Null and empty-string cells count as
/// missing.
#[must_use]
pub fn profile(frame: &Frame, id: VersionId) -> Profile {
    let columns: Vec<ColumnProfile> = frame
        .columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let mut distinct = HashSet::new();
            let mut missing = 0;
            let mut structural_type = StructuralType::Empty;
            for value in frame.column_values(index) {
                match StructuralType::of(value) {
                    None => missing += 1,
                    Some(t) => {
                        structural_type = structural_type.merge(t);
                        distinct.insert(value.to_string());
                    }
                }
            }
            ColumnProfile {
                name: name.clone(),
                structural_type,
                distinct_values: distinct.len(),
                missing_values: missing,
            }
        })
        .collect();

    let types: BTreeSet<StructuralType> = columns.iter().map(|c| c.structural_type).collect();

    Profile {
        id,
        nb_rows: frame.row_count(),
        nb_profiled_rows: frame.row_count(),
        date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        columns,
        types: types.into_iter().collect(),
    }
}
