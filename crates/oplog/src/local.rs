//! In-process execution engine that evaluates registered Rust closures row by
//! row. It is also a function registry, since it knows the descriptor of
//! every function it can run.

use crate::engine::{EngineError, ExecutionEngine};
use crate::frame::{Frame, Row, Value};
use crate::library::{FunctionDescriptor, FunctionId, FunctionRegistry};
use crate::op::{Argument, InsertColumnOp, Op, Producer, UpdateOp};
use async_trait::async_trait;
use diagnostics::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Row-level function: column values in, one value per output out
pub type Callable =
    Arc<dyn Fn(&[Value], &[Argument]) -> Result<Vec<Value>, String> + Send + Sync>;

struct Registered {
    descriptor: FunctionDescriptor,
    call: Callable,
}

#[derive(Default)]
pub struct LocalEngine {
    functions: BTreeMap<FunctionId, Registered>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. A later registration with the same identity
    /// replaces the earlier one.
    pub fn register<F>(&mut self, descriptor: FunctionDescriptor, call: F)
    where
        F: Fn(&[Value], &[Argument]) -> Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        let id = descriptor.id();
        self.functions.insert(
            id,
            Registered {
                descriptor,
                call: Arc::new(call),
            },
        );
    }

    /// Register a single-input, single-output function over one value
    pub fn register_scalar<F>(&mut self, descriptor: FunctionDescriptor, call: F)
    where
        F: Fn(&Value, &[Argument]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(descriptor, move |values, args| {
            let value = values.first().cloned().unwrap_or(Value::Null);
            Ok(vec![call(&value, args)?])
        });
    }

    fn function(&self, id: &FunctionId) -> Result<&Registered, EngineError> {
        self.functions
            .get(id)
            .ok_or_else(|| EngineError::new(format!("function {id} is not available")))
    }

    fn call(
        registered: &Registered,
        row: &Row,
        inputs: &[usize],
        args: &[Argument],
    ) -> Result<Vec<Value>, EngineError> {
        let values = inputs
            .iter()
            .map(|&i| {
                row.values.get(i).cloned().ok_or_else(|| {
                    EngineError::new(format!("row {} has no column {}", row.id, i))
                })
            })
            .collect::<Result<Vec<Value>, EngineError>>()?;
        (registered.call)(&values, args).map_err(|e| {
            EngineError::new(format!(
                "{} failed on row {}: {}",
                registered.descriptor.id(),
                row.id,
                e
            ))
        })
    }

    fn update(&self, op: &UpdateOp, input: &Frame) -> Result<Frame, EngineError> {
        let mut output = input.clone();
        match &op.values {
            Producer::Constant { value } => {
                let values = spread(value, op.columns.len());
                for row in &mut output.rows {
                    for (&column, value) in op.columns.iter().zip(&values) {
                        set(row, column, value.clone())?;
                    }
                }
            }
            Producer::Function {
                function,
                parameters,
            } => {
                let registered = self.function(function)?;
                let inputs = op.sources.as_deref().unwrap_or(&op.columns);
                let per_column = op.sources.is_none()
                    && op.columns.len() > 1
                    && registered.descriptor.input_columns == 1;
                for row in &mut output.rows {
                    if per_column {
                        for &column in &op.columns {
                            let result = Self::call(registered, row, &[column], parameters)?;
                            let value = single(result, row.id)?;
                            set(row, column, value)?;
                        }
                    } else {
                        let result = Self::call(registered, row, inputs, parameters)?;
                        if result.len() != op.columns.len() {
                            return Err(EngineError::new(format!(
                                "{} returned {} values for {} columns on row {}",
                                function,
                                result.len(),
                                op.columns.len(),
                                row.id
                            )));
                        }
                        for (&column, value) in op.columns.iter().zip(result) {
                            set(row, column, value)?;
                        }
                    }
                }
            }
        }
        Ok(output)
    }

    fn insert(&self, op: &InsertColumnOp, input: &Frame) -> Result<Frame, EngineError> {
        let at = op
            .position
            .unwrap_or(input.columns.len())
            .min(input.columns.len());
        let mut columns = input.columns.clone();
        columns.splice(at..at, op.names.iter().cloned());
        let mut output = Frame::new(columns);

        let inputs = op.sources.as_deref().unwrap_or(&[]);
        let constant = match &op.values {
            Producer::Constant { value } => Some(spread(value, op.names.len())),
            Producer::Function { .. } => None,
        };

        for row in &input.rows {
            let new_values = match (&constant, &op.values) {
                (Some(values), _) => values.clone(),
                (None, Producer::Function { function, parameters }) => {
                    let registered = self.function(function)?;
                    let result = Self::call(registered, row, inputs, parameters)?;
                    if result.len() != op.names.len() {
                        return Err(EngineError::new(format!(
                            "{} returned {} values for {} new columns on row {}",
                            function,
                            result.len(),
                            op.names.len(),
                            row.id
                        )));
                    }
                    result
                }
                (None, Producer::Constant { value }) => spread(value, op.names.len()),
            };
            let mut values = row.values.clone();
            let at = at.min(values.len());
            values.splice(at..at, new_values);
            output
                .push(Row::new(row.id, values))
                .map_err(|e| EngineError::new(e.to_string()))?;
        }
        Ok(output)
    }
}

/// One value per target column. An array with exactly one element per
/// target is spread across the targets, anything else is repeated.
fn spread(value: &Value, n: usize) -> Vec<Value> {
    match value {
        Value::Array(items) if n > 0 && items.len() == n => items.clone(),
        _ => vec![value.clone(); n],
    }
}

fn single(mut result: Vec<Value>, row: u64) -> Result<Value, EngineError> {
    if result.len() != 1 {
        return Err(EngineError::new(format!(
            "expected one value on row {row}, got {}",
            result.len()
        )));
    }
    Ok(result.remove(0))
}

fn set(row: &mut Row, column: usize, value: Value) -> Result<(), EngineError> {
    let id = row.id;
    let slot = row
        .values
        .get_mut(column)
        .ok_or_else(|| EngineError::new(format!("row {id} has no column {column}")))?;
    *slot = value;
    Ok(())
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn apply(&self, op: &Op, input: &Frame) -> Result<Frame, EngineError> {
        debug!("local engine applying {op} to {rows} rows", op: op.name(), rows: input.row_count());
        match op {
            Op::Load | Op::Sample { .. } => Ok(input.clone()),
            Op::Update(update) => self.update(update, input),
            Op::InsertColumn(insert) => self.insert(insert, input),
        }
    }
}

impl FunctionRegistry for LocalEngine {
    fn lookup(&self, id: &FunctionId) -> Option<FunctionDescriptor> {
        self.functions.get(id).map(|r| r.descriptor.clone())
    }

    fn functions(&self) -> Vec<FunctionDescriptor> {
        self.functions
            .values()
            .map(|r| r.descriptor.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::argument;
    use serde_json::json;

    fn engine() -> LocalEngine {
        let mut engine = LocalEngine::new();
        engine.register_scalar(
            FunctionDescriptor::new(FunctionId::new("string", "upper")),
            |v, _| match v {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => Ok(other.clone()),
            },
        );
        engine.register_scalar(
            FunctionDescriptor::new(FunctionId::new("number", "add")),
            |v, args| {
                let n = v.as_i64().ok_or("not an integer")?;
                let inc = argument(args, "value").and_then(Value::as_i64).unwrap_or(1);
                Ok(json!(n + inc))
            },
        );
        engine.register(
            FunctionDescriptor::new(FunctionId::new("number", "swap"))
                .with_inputs(2)
                .with_outputs(2),
            |values, _| Ok(vec![values[1].clone(), values[0].clone()]),
        );
        engine
    }

    fn frame() -> Frame {
        Frame::from_rows(
            vec!["A", "B", "C"],
            vec![
                vec![json!(1), json!(2), json!("x")],
                vec![json!(3), json!(4), json!("y")],
            ],
        )
        .expect("frame")
    }

    fn call(name: &str, ns: &str) -> Producer {
        Producer::function(FunctionId::new(ns, name), vec![])
    }

    #[test]
    fn test_update_single_column() {
        let op = Op::update(vec![2], call("upper", "string"));
        let out = tokio_test::block_on(engine().apply(&op, &frame())).expect("apply");
        let values: Vec<&Value> = out.column_values(2).collect();
        assert_eq!(values, vec![&json!("X"), &json!("Y")]);
        assert_eq!(out.column_values(0).collect::<Vec<_>>(), vec![&json!(1), &json!(3)]);
    }

    #[test]
    fn test_update_per_column_and_parameters() {
        let op = Op::update(
            vec![0, 1],
            Producer::function(
                FunctionId::new("number", "add"),
                vec![Argument::new("value", json!(10))],
            ),
        );
        let out = tokio_test::block_on(engine().apply(&op, &frame())).expect("apply");
        assert_eq!(out.rows[0].values, vec![json!(11), json!(12), json!("x")]);
    }

    #[test]
    fn test_update_multi_output() {
        let op = Op::update(vec![0, 1], call("swap", "number"));
        let out = tokio_test::block_on(engine().apply(&op, &frame())).expect("apply");
        assert_eq!(out.rows[1].values, vec![json!(4), json!(3), json!("y")]);
    }

    #[test]
    fn test_update_from_sources() {
        let op = Op::update(vec![0], call("add", "number")).with_sources(vec![1]);
        let out = tokio_test::block_on(engine().apply(&op, &frame())).expect("apply");
        assert_eq!(out.rows[0].values[0], json!(3));
        assert_eq!(out.rows[0].values[1], json!(2));
    }

    #[test]
    fn test_insert_constant_at_front() {
        let op = Op::insert_column(vec!["D"], vec![], Producer::constant(json!([5]))).at_position(0);
        let out = tokio_test::block_on(engine().apply(&op, &frame())).expect("apply");
        assert_eq!(out.columns, vec!["D", "A", "B", "C"]);
        assert_eq!(out.rows[1].values, vec![json!(5), json!(3), json!(4), json!("y")]);
    }

    #[test]
    fn test_insert_from_function() {
        let op = Op::insert_column(vec!["E"], vec![0], call("add", "number"));
        let out = tokio_test::block_on(engine().apply(&op, &frame())).expect("apply");
        assert_eq!(out.columns, vec!["A", "B", "C", "E"]);
        assert_eq!(out.rows[0].values[3], json!(2));
        assert_eq!(out.rows[0].values[0], json!(1));
    }

    #[test]
    fn test_function_error_names_row() {
        let op = Op::update(vec![2], call("add", "number"));
        let err = tokio_test::block_on(engine().apply(&op, &frame())).expect_err("fails");
        assert!(err.message.contains("row 0"), "{}", err.message);
    }

    #[test]
    fn test_unknown_function_fails() {
        let op = Op::update(vec![0], call("lower", "string"));
        assert!(tokio_test::block_on(engine().apply(&op, &frame())).is_err());
    }

    #[test]
    fn test_engine_is_a_registry() {
        let engine = engine();
        assert_eq!(engine.functions().len(), 3);
        let add = engine.resolve(&FunctionId::bare("add")).expect("resolves");
        assert_eq!(add.namespace.as_deref(), Some("number"));
    }
}
