//! The version log: an ordered sequence of provenance entries for one
//! dataset session.
//!
//! Entry 0 is always `Load` and is committed from the start. Every later
//! entry is appended uncommitted; a commit seals the uncommitted suffix and a
//! rollback discards uncommitted entries after a target version. The log is a
//! plain value: locking is the owner's concern.

use crate::error::{OpLogError, Result};
use crate::library::FunctionRegistry;
use crate::op::{InsertColumnOp, Op, Producer, UpdateOp};
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Version identifier, assigned in increasing order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceEntry {
    pub id: VersionId,
    pub op: Op,
    pub is_committed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "LogRepr")]
pub struct VersionLog {
    entries: Vec<ProvenanceEntry>,
    next_id: u64,
}

/// Unchecked serialized form, validated on the way in
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRepr {
    entries: Vec<ProvenanceEntry>,
    next_id: u64,
}

impl TryFrom<LogRepr> for VersionLog {
    type Error = OpLogError;

    fn try_from(repr: LogRepr) -> Result<Self> {
        let corrupt = |reason: &str| OpLogError::invalid_argument(format!("corrupt version log: {reason}"));
        match repr.entries.first() {
            Some(first) if first.id == VersionId(0) && first.op == Op::Load && first.is_committed => {}
            _ => return Err(corrupt("entry 0 must be a committed load")),
        }
        if repr.entries.windows(2).any(|w| w[0].id >= w[1].id) {
            return Err(corrupt("version ids must increase"));
        }
        if repr.entries.windows(2).any(|w| !w[0].is_committed && w[1].is_committed) {
            return Err(corrupt("committed entries must form a prefix"));
        }
        if repr.entries.iter().any(|e| e.id.0 >= repr.next_id) {
            return Err(corrupt("next id is not past the tail"));
        }
        Ok(VersionLog {
            entries: repr.entries,
            next_id: repr.next_id,
        })
    }
}

impl Default for VersionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionLog {
    /// A fresh log holding only the committed `Load` entry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: vec![ProvenanceEntry {
                id: VersionId(0),
                op: Op::Load,
                is_committed: true,
            }],
            next_id: 1,
        }
    }

    /// Log for a session whose rows are a sample of size `n` of a larger
    /// dataset. The `Sample` entry is sealed together with `Load`.
    #[must_use]
    pub fn sampled(n: usize, seed: Option<u64>) -> Self {
        let mut log = Self::new();
        log.entries.push(ProvenanceEntry {
            id: VersionId(1),
            op: Op::Sample { n, seed },
            is_committed: true,
        });
        log.next_id = 2;
        log
    }

    #[must_use]
    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the `Load` entry cannot be removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn tail(&self) -> VersionId {
        self.entries.last().map_or(VersionId(0), |e| e.id)
    }

    pub fn get(&self, id: VersionId) -> Option<&ProvenanceEntry> {
        self.position(id).map(|p| &self.entries[p])
    }

    fn position(&self, id: VersionId) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }

    /// Number of entries in the committed prefix
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.entries.partition_point(|e| e.is_committed)
    }

    #[must_use]
    pub fn uncommitted(&self) -> &[ProvenanceEntry] {
        &self.entries[self.committed_len()..]
    }

    /// Resolve an optional version (absent means tail), checking it exists
    pub fn resolve(&self, version: Option<VersionId>) -> Result<VersionId> {
        match version {
            None => Ok(self.tail()),
            Some(id) if self.position(id).is_some() => Ok(id),
            Some(id) => Err(OpLogError::invalid_version(id, "no such version")),
        }
    }

    /// Entries from `Load` through `version` inclusive (tail when absent)
    pub fn entries_up_to(&self, version: Option<VersionId>) -> Result<&[ProvenanceEntry]> {
        let id = self.resolve(version)?;
        let end = self.position(id).map_or(self.entries.len(), |p| p + 1);
        Ok(&self.entries[..end])
    }

    /// Column names at the tail, derived from the loaded columns
    #[must_use]
    pub fn schema(&self, base_columns: &[String]) -> Vec<String> {
        let mut columns = base_columns.to_vec();
        for entry in &self.entries {
            entry.op.apply_schema(&mut columns);
        }
        columns
    }

    /// Validate `op` against the library and the tail schema, then append it
    /// as a new uncommitted entry.
    ///
    /// The stored op carries the resolved function identity and the bound
    /// parameter values.
    pub fn append(
        &mut self,
        op: Op,
        library: &dyn FunctionRegistry,
        base_columns: &[String],
    ) -> Result<VersionId> {
        let columns = self.schema(base_columns);
        let op = resolve_op(op, library, &columns)?;
        let id = VersionId(self.next_id);
        let name = op.name();
        self.entries.push(ProvenanceEntry {
            id,
            op,
            is_committed: false,
        });
        self.next_id += 1;
        info!("appended {op} as version {version}", op: name, version: id.0);
        Ok(id)
    }

    /// Discard every entry after `target`. Returns the discarded entries.
    pub fn rollback(&mut self, target: VersionId) -> Result<Vec<ProvenanceEntry>> {
        let pos = self
            .position(target)
            .ok_or_else(|| OpLogError::invalid_version(target, "no such version"))?;
        if let Some(sealed) = self.entries[pos + 1..].iter().find(|e| e.is_committed) {
            return Err(OpLogError::invalid_version(
                target,
                format!("version {} is committed", sealed.id),
            ));
        }
        let removed = self.entries.split_off(pos + 1);
        info!("rolled back to version {version}, discarded {count} entries",
              version: target.0, count: removed.len());
        Ok(removed)
    }

    /// Seal the whole uncommitted suffix. Returns the newly committed entries
    /// in log order.
    pub fn commit(&mut self) -> Result<Vec<ProvenanceEntry>> {
        let tail = self.tail();
        self.commit_through(tail)
    }

    /// Seal the uncommitted entries up to and including `id`
    pub fn commit_through(&mut self, id: VersionId) -> Result<Vec<ProvenanceEntry>> {
        let pos = self
            .position(id)
            .ok_or_else(|| OpLogError::invalid_version(id, "no such version"))?;
        let start = self.committed_len();
        if pos < start {
            return Err(OpLogError::NothingToCommit);
        }
        for entry in &mut self.entries[start..=pos] {
            entry.is_committed = true;
        }
        let sealed = self.entries[start..=pos].to_vec();
        info!("committed {count} entries through version {version}",
              count: sealed.len(), version: id.0);
        Ok(sealed)
    }
}

fn check_columns(what: &str, indices: &[usize], count: usize) -> Result<()> {
    if let Some(bad) = indices.iter().find(|&&i| i >= count) {
        return Err(OpLogError::invalid_operation(format!(
            "{what} column {bad} out of range, dataset has {count} columns"
        )));
    }
    Ok(())
}

/// Resolve a producer's function reference and check its arity.
///
/// `per_column` allows a single-input, single-output function to be applied
/// to each target column separately.
fn resolve_producer(
    values: Producer,
    library: &dyn FunctionRegistry,
    inputs: usize,
    outputs: usize,
    per_column: bool,
) -> Result<Producer> {
    match values {
        Producer::Constant { value } => Ok(Producer::Constant { value }),
        Producer::Function {
            function,
            parameters,
        } => {
            let descriptor = library.resolve(&function)?;
            let parameters = descriptor.bind(&parameters)?;
            let fits = descriptor.input_columns == inputs && descriptor.outputs == outputs;
            let fits_per_column =
                per_column && descriptor.input_columns == 1 && descriptor.outputs == 1;
            if !fits && !fits_per_column {
                return Err(OpLogError::invalid_operation(format!(
                    "function {} takes {} columns and returns {} values, operation supplies {} and expects {}",
                    descriptor.id(),
                    descriptor.input_columns,
                    descriptor.outputs,
                    inputs,
                    outputs
                )));
            }
            Ok(Producer::Function {
                function: descriptor.id(),
                parameters,
            })
        }
    }
}

fn resolve_op(op: Op, library: &dyn FunctionRegistry, columns: &[String]) -> Result<Op> {
    let count = columns.len();
    match op {
        Op::Load | Op::Sample { .. } => Err(OpLogError::invalid_operation(format!(
            "{} entries are created with the log and cannot be appended",
            op.name()
        ))),
        Op::Update(UpdateOp {
            columns: targets,
            values,
            sources,
        }) => {
            if targets.is_empty() {
                return Err(OpLogError::invalid_operation("update names no target columns"));
            }
            check_columns("target", &targets, count)?;
            if let Some(sources) = &sources {
                check_columns("source", sources, count)?;
            }
            let inputs = sources.as_ref().map_or(targets.len(), Vec::len);
            let values =
                resolve_producer(values, library, inputs, targets.len(), sources.is_none())?;
            Ok(Op::Update(UpdateOp {
                columns: targets,
                values,
                sources,
            }))
        }
        Op::InsertColumn(InsertColumnOp {
            names,
            values,
            sources,
            position,
        }) => {
            if names.is_empty() {
                return Err(OpLogError::invalid_operation("insert names no new columns"));
            }
            let mut seen: HashSet<&str> = columns.iter().map(String::as_str).collect();
            for name in &names {
                if name.is_empty() {
                    return Err(OpLogError::invalid_operation("column name must not be empty"));
                }
                if !seen.insert(name.as_str()) {
                    return Err(OpLogError::invalid_operation(format!(
                        "duplicate column name '{name}'"
                    )));
                }
            }
            if let Some(sources) = &sources {
                check_columns("source", sources, count)?;
            }
            if let Some(pos) = position {
                if pos > count {
                    return Err(OpLogError::invalid_operation(format!(
                        "insert position {pos} out of range, dataset has {count} columns"
                    )));
                }
            }
            let inputs = sources.as_ref().map_or(0, Vec::len);
            let values = resolve_producer(values, library, inputs, names.len(), false)?;
            Ok(Op::InsertColumn(InsertColumnOp {
                names,
                values,
                sources,
                position,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{FunctionDescriptor, FunctionId, ObjectLibrary};
    use serde_json::json;

    fn library() -> ObjectLibrary {
        let mut lib = ObjectLibrary::new();
        lib.register(FunctionDescriptor::new(FunctionId::new("string", "upper")))
            .expect("register");
        lib.register(FunctionDescriptor::new(FunctionId::new("number", "bin")))
            .expect("register");
        lib.register(
            FunctionDescriptor::new(FunctionId::new("string", "split"))
                .with_outputs(2),
        )
        .expect("register");
        lib
    }

    fn base() -> Vec<String> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    fn upper(column: usize) -> Op {
        Op::update(
            vec![column],
            Producer::function(FunctionId::bare("upper"), vec![]),
        )
    }

    #[test]
    fn test_new_log_has_committed_load() {
        let log = VersionLog::new();
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].op, Op::Load);
        assert!(log.entries()[0].is_committed);
        assert_eq!(log.tail(), VersionId(0));
        assert!(log.uncommitted().is_empty());
    }

    #[test]
    fn test_append_assigns_increasing_ids_and_resolves_namespace() {
        let lib = library();
        let mut log = VersionLog::new();
        let v1 = log.append(upper(0), &lib, &base()).expect("append");
        let v2 = log.append(upper(1), &lib, &base()).expect("append");
        assert_eq!(v1, VersionId(1));
        assert_eq!(v2, VersionId(2));
        assert_eq!(log.uncommitted().len(), 2);
        match &log.entries()[1].op {
            Op::Update(u) => assert_eq!(
                u.values,
                Producer::function(FunctionId::new("string", "upper"), vec![])
            ),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_append_rejects_invalid_operations() {
        let lib = library();
        let mut log = VersionLog::new();
        let before = log.clone();

        let unknown = Op::update(vec![0], Producer::function(FunctionId::bare("nope"), vec![]));
        assert!(matches!(log.append(unknown, &lib, &base()), Err(OpLogError::InvalidOperation(_))));
        assert!(matches!(log.append(upper(3), &lib, &base()), Err(OpLogError::InvalidOperation(_))));

        let bad_source = upper(0).with_sources(vec![7]);
        assert!(log.append(bad_source, &lib, &base()).is_err());

        let duplicate = Op::insert_column(vec!["B"], vec![], Producer::constant(json!(1)));
        assert!(log.append(duplicate, &lib, &base()).is_err());

        let twice = Op::insert_column(vec!["X", "X"], vec![], Producer::constant(json!(1)));
        assert!(log.append(twice, &lib, &base()).is_err());

        let far = Op::insert_column(vec!["X"], vec![], Producer::constant(json!(1))).at_position(4);
        assert!(log.append(far, &lib, &base()).is_err());

        let arity = Op::insert_column(
            vec!["X"],
            vec![0],
            Producer::function(FunctionId::bare("split"), vec![]),
        );
        assert!(log.append(arity, &lib, &base()).is_err());

        assert!(log.append(Op::Load, &lib, &base()).is_err());
        assert_eq!(log, before);
    }

    #[test]
    fn test_duplicate_check_sees_inserted_columns() {
        let lib = library();
        let mut log = VersionLog::new();
        let insert = Op::insert_column(vec!["bucket"], vec![2], Producer::function(FunctionId::bare("bin"), vec![]));
        log.append(insert.clone(), &lib, &base()).expect("append");
        assert_eq!(log.schema(&base()), vec!["A", "B", "C", "bucket"]);
        assert!(log.append(insert, &lib, &base()).is_err());
        // The new column is a valid target.
        log.append(upper(3), &lib, &base()).expect("append");
    }

    #[test]
    fn test_rollback_never_reuses_ids() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        let removed = log.rollback(VersionId(0)).expect("rollback");
        assert_eq!(removed.len(), 1);
        assert_eq!(log, {
            let mut fresh = VersionLog::new();
            fresh.next_id = 2;
            fresh
        });
        let v = log.append(upper(0), &lib, &base()).expect("append");
        assert_eq!(v, VersionId(2));
    }

    #[test]
    fn test_rollback_to_tail_is_noop() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        let before = log.clone();
        assert!(log.rollback(VersionId(1)).expect("rollback").is_empty());
        assert_eq!(log, before);
    }

    #[test]
    fn test_rollback_rejects_unknown_and_committed() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        assert!(matches!(
            log.rollback(VersionId(9)),
            Err(OpLogError::InvalidVersion { .. })
        ));
        log.commit().expect("commit");
        let before = log.clone();
        assert!(matches!(
            log.rollback(VersionId(0)),
            Err(OpLogError::InvalidVersion { .. })
        ));
        assert_eq!(log, before);
    }

    #[test]
    fn test_commit_seals_suffix_in_order() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        log.append(upper(1), &lib, &base()).expect("append");
        let sealed = log.commit().expect("commit");
        let ids: Vec<VersionId> = sealed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![VersionId(1), VersionId(2)]);
        assert!(log.entries().iter().all(|e| e.is_committed));
        assert_eq!(log.committed_len(), 3);
    }

    #[test]
    fn test_commit_with_nothing_pending_leaves_log_unchanged() {
        let mut log = VersionLog::new();
        let before = serde_json::to_string(&log).expect("serializes");
        assert_eq!(log.commit(), Err(OpLogError::NothingToCommit));
        assert_eq!(serde_json::to_string(&log).expect("serializes"), before);
    }

    #[test]
    fn test_commit_through_seals_prefix_only() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        log.append(upper(1), &lib, &base()).expect("append");
        let sealed = log.commit_through(VersionId(1)).expect("commit");
        assert_eq!(sealed.len(), 1);
        assert_eq!(log.uncommitted().len(), 1);
        assert_eq!(log.commit_through(VersionId(1)), Err(OpLogError::NothingToCommit));
        // Rolling back to the sealed entry drops only the pending one.
        log.rollback(VersionId(1)).expect("rollback");
        assert_eq!(log.tail(), VersionId(1));
    }

    #[test]
    fn test_entries_up_to() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        log.append(upper(1), &lib, &base()).expect("append");
        assert_eq!(log.entries_up_to(None).expect("tail").len(), 3);
        assert_eq!(log.entries_up_to(Some(VersionId(1))).expect("v1").len(), 2);
        assert!(log.entries_up_to(Some(VersionId(5))).is_err());
    }

    #[test]
    fn test_sampled_log_is_sealed() {
        let log = VersionLog::sampled(100, Some(7));
        assert_eq!(log.len(), 2);
        assert_eq!(log.committed_len(), 2);
        assert_eq!(log.tail(), VersionId(1));
    }

    #[test]
    fn test_serialized_log_round_trip_is_checked() {
        let lib = library();
        let mut log = VersionLog::new();
        log.append(upper(0), &lib, &base()).expect("append");
        let doc = serde_json::to_value(&log).expect("serializes");
        assert_eq!(doc["entries"][1]["isCommitted"], json!(false));
        let back: VersionLog = serde_json::from_value(doc.clone()).expect("deserializes");
        assert_eq!(back, log);

        let mut broken = doc;
        broken["entries"][0]["isCommitted"] = json!(false);
        assert!(serde_json::from_value::<VersionLog>(broken).is_err());
    }
}
