//! Function library: descriptors for the named functions that `Update` and
//! `InsertColumn` operations may invoke.
//!
//! The core only reads the library. Lookups happen on every append, the full
//! listing is returned to clients that ask for it.

use crate::error::{OpLogError, Result};
use crate::frame::Value;
use crate::op::Argument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Floats in [-2^63, 2^63) convert to i64 exactly.
const I64_LOWER: f64 = i64::MIN as f64;
const I64_UPPER: f64 = i64::MAX as f64;

/// Identity of a library function.
///
/// A reference coming from a client may omit the namespace; appends resolve
/// it against the library so that stored operations always carry one when
/// the function lives in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl FunctionId {
    pub fn new<N: Into<String>, S: Into<String>>(namespace: N, name: S) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// A reference by name only
    pub fn bare<S: Into<String>>(name: S) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}::{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
    Select,
    List,
    Record,
    File,
}

/// Declaration of one additional (non-column) function argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    pub dtype: DataType,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Admissible values of a `select` parameter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
}

impl ParameterSpec {
    pub fn new<S: Into<String>>(name: S, dtype: DataType, index: usize) -> Self {
        Self {
            name: name.into(),
            dtype,
            index,
            default_value: None,
            is_required: false,
            group: None,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    #[must_use]
    pub fn in_group<S: Into<String>>(mut self, group: S) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_options(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }

    /// Convert a client-supplied value to this parameter's type.
    ///
    /// Strings are parsed for scalar types since form widgets send text.
    pub fn cast(&self, value: &Value) -> std::result::Result<Value, String> {
        if value.is_null() {
            return if self.is_required {
                Err(format!("parameter '{}' is required", self.name))
            } else {
                Ok(Value::Null)
            };
        }
        let mismatch = || format!("parameter '{}' expects {:?}, got {}", self.name, self.dtype, value);
        match self.dtype {
            DataType::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            DataType::Int => {
                if let Some(n) = value.as_i64() {
                    return Ok(Value::from(n));
                }
                match value {
                    Value::Number(n) => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && (I64_LOWER..I64_UPPER).contains(&f) => {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(mismatch()),
                    },
                    Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch()),
                    _ => Err(mismatch()),
                }
            }
            DataType::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(mismatch),
                Value::String(s) => s.trim().parse::<f64>().map(Value::from).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            DataType::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(_) | Value::Bool(_) => Ok(Value::String(value.to_string())),
                _ => Err(mismatch()),
            },
            DataType::Select => {
                if self.values.is_empty() || self.values.contains(value) {
                    Ok(value.clone())
                } else {
                    Err(format!(
                        "parameter '{}' does not accept {}",
                        self.name, value
                    ))
                }
            }
            DataType::List => match value {
                Value::Array(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            DataType::Record => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            DataType::File => match value {
                Value::String(_) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Number of column values the function receives per row
    pub input_columns: usize,
    /// Number of values the function returns per row
    pub outputs: usize,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl FunctionDescriptor {
    /// Single-input, single-output function
    pub fn new(id: FunctionId) -> Self {
        Self {
            namespace: id.namespace,
            name: id.name,
            label: None,
            help: None,
            input_columns: 1,
            outputs: 1,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    #[must_use]
    pub fn with_inputs(mut self, n: usize) -> Self {
        self.input_columns = n;
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, n: usize) -> Self {
        self.outputs = n;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn id(&self) -> FunctionId {
        FunctionId {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validate client arguments against the declared parameters.
    ///
    /// Returns one argument per declared parameter that has a value (given or
    /// default), ordered by parameter index, with values cast to their dtype.
    pub fn bind(&self, args: &[Argument]) -> Result<Vec<Argument>> {
        let mut given: BTreeMap<&str, &Value> = BTreeMap::new();
        for arg in args {
            if self.parameter(&arg.name).is_none() {
                return Err(OpLogError::invalid_operation(format!(
                    "unknown parameter '{}' for function {}",
                    arg.name,
                    self.id()
                )));
            }
            if given.insert(arg.name.as_str(), &arg.value).is_some() {
                return Err(OpLogError::invalid_operation(format!(
                    "parameter '{}' given more than once",
                    arg.name
                )));
            }
        }

        let mut params: Vec<&ParameterSpec> = self.parameters.iter().collect();
        params.sort_by_key(|p| p.index);

        let mut bound = Vec::with_capacity(params.len());
        for param in params {
            let value = match given.get(param.name.as_str()) {
                Some(value) => param.cast(value).map_err(OpLogError::InvalidOperation)?,
                None => match &param.default_value {
                    Some(default) => default.clone(),
                    None if param.is_required => {
                        return Err(OpLogError::invalid_operation(format!(
                            "missing required parameter '{}' for function {}",
                            param.name,
                            self.id()
                        )));
                    }
                    None => continue,
                },
            };
            bound.push(Argument::new(param.name.clone(), value));
        }
        Ok(bound)
    }
}

/// Read access to a set of function descriptors
pub trait FunctionRegistry: Send + Sync {
    /// Exact lookup by identity
    fn lookup(&self, id: &FunctionId) -> Option<FunctionDescriptor>;

    /// Every registered function, ordered by identity
    fn functions(&self) -> Vec<FunctionDescriptor>;

    /// Resolve a client reference. A reference without namespace matches a
    /// function registered without namespace first, otherwise the only
    /// function with that name in any namespace.
    fn resolve(&self, id: &FunctionId) -> Result<FunctionDescriptor> {
        if let Some(found) = self.lookup(id) {
            return Ok(found);
        }
        if id.namespace.is_some() {
            return Err(OpLogError::invalid_operation(format!("unknown function {id}")));
        }
        let mut candidates: Vec<FunctionDescriptor> = self
            .functions()
            .into_iter()
            .filter(|f| f.name == id.name)
            .collect();
        match candidates.len() {
            0 => Err(OpLogError::invalid_operation(format!("unknown function {id}"))),
            1 => Ok(candidates.remove(0)),
            _ => Err(OpLogError::invalid_operation(format!(
                "function name '{}' is ambiguous, specify a namespace",
                id.name
            ))),
        }
    }
}

/// In-memory function registry
#[derive(Debug, Clone, Default)]
pub struct ObjectLibrary {
    functions: BTreeMap<FunctionId, FunctionDescriptor>,
}

impl ObjectLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: FunctionDescriptor) -> Result<()> {
        let id = descriptor.id();
        if self.functions.contains_key(&id) {
            return Err(OpLogError::invalid_operation(format!(
                "function {id} is already registered"
            )));
        }
        self.functions.insert(id, descriptor);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FunctionRegistry for ObjectLibrary {
    fn lookup(&self, id: &FunctionId) -> Option<FunctionDescriptor> {
        self.functions.get(id).cloned()
    }

    fn functions(&self) -> Vec<FunctionDescriptor> {
        self.functions.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library() -> ObjectLibrary {
        let mut lib = ObjectLibrary::new();
        lib.register(FunctionDescriptor::new(FunctionId::new("string", "upper")))
            .expect("register");
        lib.register(FunctionDescriptor::new(FunctionId::new("string", "trim")))
            .expect("register");
        lib.register(FunctionDescriptor::new(FunctionId::new("text", "trim")))
            .expect("register");
        lib.register(
            FunctionDescriptor::new(FunctionId::new("number", "add")).with_parameter(
                ParameterSpec::new("value", DataType::Int, 0).with_default(json!(1)),
            ),
        )
        .expect("register");
        lib
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut lib = library();
        let result = lib.register(FunctionDescriptor::new(FunctionId::new("string", "upper")));
        assert!(matches!(result, Err(OpLogError::InvalidOperation(_))));
    }

    #[test]
    fn test_resolve_bare_name() {
        let lib = library();
        let f = lib.resolve(&FunctionId::bare("upper")).expect("resolves");
        assert_eq!(f.id(), FunctionId::new("string", "upper"));
    }

    #[test]
    fn test_resolve_ambiguous_and_unknown() {
        let lib = library();
        assert!(lib.resolve(&FunctionId::bare("trim")).is_err());
        assert!(lib.resolve(&FunctionId::new("text", "trim")).is_ok());
        assert!(lib.resolve(&FunctionId::bare("nope")).is_err());
        assert!(lib.resolve(&FunctionId::new("text", "upper")).is_err());
    }

    #[test]
    fn test_bind_fills_defaults_and_casts() {
        let lib = library();
        let add = lib.resolve(&FunctionId::bare("add")).expect("resolves");
        let bound = add.bind(&[]).expect("binds");
        assert_eq!(bound, vec![Argument::new("value", json!(1))]);

        let bound = add
            .bind(&[Argument::new("value", json!("5"))])
            .expect("binds");
        assert_eq!(bound, vec![Argument::new("value", json!(5))]);

        assert!(add.bind(&[Argument::new("value", json!("five"))]).is_err());
        assert!(add.bind(&[Argument::new("other", json!(1))]).is_err());
    }

    #[test]
    fn test_bind_required_parameter() {
        let f = FunctionDescriptor::new(FunctionId::new("string", "replace"))
            .with_parameter(ParameterSpec::new("pattern", DataType::String, 0).required())
            .with_parameter(ParameterSpec::new("replacement", DataType::String, 1));
        assert!(f.bind(&[]).is_err());
        let bound = f
            .bind(&[Argument::new("pattern", json!("a+"))])
            .expect("binds");
        assert_eq!(bound.len(), 1);
    }

    #[test]
    fn test_cast_select_and_bool() {
        let select = ParameterSpec::new("mode", DataType::Select, 0)
            .with_options(vec![json!("left"), json!("right")]);
        assert_eq!(select.cast(&json!("left")), Ok(json!("left")));
        assert!(select.cast(&json!("up")).is_err());

        let flag = ParameterSpec::new("flag", DataType::Bool, 0);
        assert_eq!(flag.cast(&json!("TRUE")), Ok(json!(true)));
        assert!(flag.cast(&json!(1)).is_err());

        let float = ParameterSpec::new("width", DataType::Float, 0);
        assert_eq!(float.cast(&json!(2)), Ok(json!(2.0)));
    }

    #[test]
    fn test_cast_int_rejects_out_of_range_floats() {
        let int = ParameterSpec::new("count", DataType::Int, 0);
        assert_eq!(int.cast(&json!(4.0)), Ok(json!(4)));
        assert_eq!(int.cast(&json!(-4.0)), Ok(json!(-4)));
        assert!(int.cast(&json!(1e30)).is_err());
        assert!(int.cast(&json!(-1e30)).is_err());
        assert!(int.cast(&json!(9_223_372_036_854_775_808.0)).is_err());
    }

    #[test]
    fn test_descriptor_serialization_uses_camel_case() {
        let f = FunctionDescriptor::new(FunctionId::new("number", "bin")).with_parameter(
            ParameterSpec::new("width", DataType::Float, 0)
                .with_default(json!(10.0))
                .required(),
        );
        let doc = serde_json::to_value(&f).expect("serializes");
        assert_eq!(doc["inputColumns"], json!(1));
        assert_eq!(doc["parameters"][0]["isRequired"], json!(true));
        assert_eq!(doc["parameters"][0]["defaultValue"], json!(10.0));
        assert_eq!(doc["parameters"][0]["dtype"], json!("float"));
    }
}
