//! Host interop: the value representation on the Rust side of the boundary,
//! conversions in both directions and registered host libraries.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rand::Rng;

use crate::runtime::value::{field_map, ErrorValue, NativeFunction, Value};

pub type HostMap = IndexMap<String, HostValue>;

/// A host callable. Errors come back as [`HostError`] and become error values.
pub type HostFn = Rc<dyn Fn(Vec<HostValue>) -> Result<HostValue, HostError>>;

/// A value on the host side of the boundary.
#[derive(Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<HostValue>),
    Map(HostMap),
    Function(String, HostFn),
    /// An arbitrary host object, tagged with the name of its constructor.
    Opaque {
        constructor: String,
        value: Rc<dyn Any>,
    },
    Error(HostError),
}

impl HostValue {
    pub fn opaque<T: Any>(constructor: impl Into<String>, value: T) -> Self {
        HostValue::Opaque {
            constructor: constructor.into(),
            value: Rc::new(value),
        }
    }

    /// Name shown when the value is displayed as a raw value.
    pub fn constructor_name(&self) -> &str {
        match self {
            HostValue::Null => "Null",
            HostValue::Bool(_) => "Boolean",
            HostValue::Number(_) => "Number",
            HostValue::String(_) => "String",
            HostValue::List(_) => "Array",
            HostValue::Map(_) => "Object",
            HostValue::Function(..) => "Function",
            HostValue::Opaque { constructor, .. } => constructor,
            HostValue::Error(_) => "Error",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "Null"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Number(n) => write!(f, "Number({})", n),
            HostValue::String(s) => write!(f, "String({:?})", s),
            HostValue::List(items) => f.debug_list().entries(items).finish(),
            HostValue::Map(map) => f.debug_map().entries(map.iter()).finish(),
            HostValue::Function(name, _) => write!(f, "Function({})", name),
            HostValue::Opaque { constructor, .. } => write!(f, "Opaque({})", constructor),
            HostValue::Error(err) => write!(f, "Error({:?})", err.message),
        }
    }
}

/// An error raised by host code.
#[derive(Debug, Clone)]
pub struct HostError {
    pub message: String,
    pub properties: HostMap,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            properties: HostMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => HostValue::Null,
            serde_json::Value::Bool(b) => HostValue::Bool(b),
            serde_json::Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => HostValue::String(s),
            serde_json::Value::Array(items) => {
                HostValue::List(items.into_iter().map(HostValue::from).collect())
            }
            serde_json::Value::Object(map) => HostValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, HostValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl HostValue {
    /// JSON form; functions and opaque values become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            HostValue::Null | HostValue::Function(..) | HostValue::Opaque { .. } => {
                serde_json::Value::Null
            }
            HostValue::Bool(b) => serde_json::Value::Bool(*b),
            HostValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            HostValue::String(s) => serde_json::Value::String(s.clone()),
            HostValue::List(items) => {
                serde_json::Value::Array(items.iter().map(HostValue::to_json).collect())
            }
            HostValue::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            HostValue::Error(err) => {
                let mut obj = serde_json::Map::new();
                obj.insert(
                    "message".to_string(),
                    serde_json::Value::String(err.message.clone()),
                );
                for (k, v) in &err.properties {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            }
        }
    }
}

/// Convert a script value for the host.
///
/// Script functions and coroutines cross as opaque values wrapping
/// themselves, so they come back unchanged.
pub fn to_host(value: &Value) -> HostValue {
    match value {
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Number(n) => HostValue::Number(*n),
        Value::String(s) => HostValue::String(s.clone()),
        Value::List(items) => HostValue::List(items.borrow().iter().map(to_host).collect()),
        Value::Object(obj) => HostValue::Map(
            obj.borrow()
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), to_host(v)))
                .collect(),
        ),
        Value::Error(err) => HostValue::Error(HostError {
            message: err.message.clone(),
            properties: err
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), to_host(v)))
                .collect(),
        }),
        Value::Raw(raw) => (**raw).clone(),
        Value::Function(_) | Value::Native(_) | Value::Coroutine(_) => {
            HostValue::opaque("Function", value.clone())
        }
    }
}

/// Convert a host value into a script value.
pub fn from_host(value: HostValue) -> Value {
    match value {
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::Bool(b),
        HostValue::Number(n) => Value::Number(n),
        HostValue::String(s) => Value::String(s),
        HostValue::List(items) => Value::list(items.into_iter().map(from_host).collect()),
        HostValue::Map(map) => {
            let mut fields = field_map();
            for (k, v) in map {
                fields.insert(k, from_host(v));
            }
            Value::object(fields)
        }
        HostValue::Function(name, func) => Value::Native(host_native(name, func)),
        HostValue::Opaque { constructor, value } => match value.downcast_ref::<Value>() {
            Some(inner) => inner.clone(),
            None => Value::Raw(Rc::new(HostValue::Opaque { constructor, value })),
        },
        HostValue::Error(err) => host_error_value(err),
    }
}

pub fn host_error_value(err: HostError) -> Value {
    let mut properties = field_map();
    for (k, v) in err.properties {
        properties.insert(k, from_host(v));
    }
    Value::Error(Rc::new(ErrorValue::with_properties(err.message, properties)))
}

/// Wrap a host callable as a non-builtin native that marshals its arguments
/// and result.
pub fn host_native(name: String, func: HostFn) -> NativeFunction {
    NativeFunction::host(name, move |_vm, args| {
        let args = args.iter().map(to_host).collect();
        Ok(match func(args) {
            Ok(result) => from_host(result),
            Err(err) => host_error_value(err),
        })
    })
}

/// A named set of host functions loadable with `loadLib`.
#[derive(Clone)]
pub struct HostLibrary {
    pub name: String,
    pub functions: Vec<(String, HostFn)>,
}

impl HostLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn function<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<HostValue, HostError> + 'static,
    {
        self.functions.push((name.into(), Rc::new(func)));
        self
    }

    /// The library as a script object of natives.
    pub fn to_value(&self) -> Value {
        let mut fields = field_map();
        for (name, func) in &self.functions {
            let qualified = format!("{}.{}", self.name, name);
            fields.insert(
                name.clone(),
                Value::Native(host_native(qualified, func.clone())),
            );
        }
        Value::object(fields)
    }
}

impl fmt::Debug for HostLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.functions.iter().map(|(n, _)| n.as_str()).collect();
        write!(f, "HostLibrary({}: {:?})", self.name, names)
    }
}

fn expect_string(args: &[HostValue], idx: usize, func: &str) -> Result<String, HostError> {
    match args.get(idx) {
        Some(HostValue::String(s)) => Ok(s.clone()),
        other => Err(HostError::new(format!(
            "{}() expects a string argument, got {:?}",
            func, other
        ))),
    }
}

fn expect_number(args: &[HostValue], idx: usize, func: &str) -> Result<f64, HostError> {
    args.get(idx).and_then(HostValue::as_number).ok_or_else(|| {
        HostError::new(format!("{}() expects a number argument", func))
            .with_property("index", HostValue::Number(idx as f64))
    })
}

/// `json.parse` / `json.stringify`.
pub fn json_library() -> HostLibrary {
    HostLibrary::new("json")
        .function("parse", |args| {
            let text = expect_string(&args, 0, "parse")?;
            serde_json::from_str::<serde_json::Value>(&text)
                .map(HostValue::from)
                .map_err(|e| {
                    HostError::new(format!("Invalid JSON: {}", e))
                        .with_property("line", HostValue::Number(e.line() as f64))
                        .with_property("column", HostValue::Number(e.column() as f64))
                })
        })
        .function("stringify", |args| {
            let value = args.first().cloned().unwrap_or(HostValue::Null);
            let pretty = matches!(args.get(1), Some(HostValue::Bool(true)));
            let json = value.to_json();
            let text = if pretty {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            text.map(HostValue::String)
                .map_err(|e| HostError::new(e.to_string()))
        })
}

fn unary_math(name: &'static str, f: fn(f64) -> f64) -> impl Fn(Vec<HostValue>) -> Result<HostValue, HostError> {
    move |args| Ok(HostValue::Number(f(expect_number(&args, 0, name)?)))
}

/// `math.*` numeric helpers.
pub fn math_library() -> HostLibrary {
    HostLibrary::new("math")
        .function("sqrt", unary_math("sqrt", f64::sqrt))
        .function("floor", unary_math("floor", f64::floor))
        .function("ceil", unary_math("ceil", f64::ceil))
        .function("abs", unary_math("abs", f64::abs))
        .function("round", unary_math("round", f64::round))
        .function("pow", |args| {
            let base = expect_number(&args, 0, "pow")?;
            let exp = expect_number(&args, 1, "pow")?;
            Ok(HostValue::Number(base.powf(exp)))
        })
        .function("min", |args| fold_numbers(&args, "min", f64::min))
        .function("max", |args| fold_numbers(&args, "max", f64::max))
        .function("random", |_| Ok(HostValue::Number(rand::thread_rng().gen::<f64>())))
}

fn fold_numbers(args: &[HostValue], name: &str, f: fn(f64, f64) -> f64) -> Result<HostValue, HostError> {
    // A single list argument is folded too
    let items: &[HostValue] = match args {
        [HostValue::List(items)] => items,
        _ => args,
    };
    if items.is_empty() {
        return Err(HostError::new(format!("{}() expects at least one number", name)));
    }
    let mut acc = expect_number(items, 0, name)?;
    for idx in 1..items.len() {
        acc = f(acc, expect_number(items, idx, name)?);
    }
    Ok(HostValue::Number(acc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Socket;

    #[test]
    fn test_structural_round_trip() {
        let mut fields = field_map();
        fields.insert("a".to_string(), Value::list(vec![Value::Number(1.0)]));
        let value = Value::object(fields);
        assert_eq!(from_host(to_host(&value)), value);
    }

    #[test]
    fn test_opaque_becomes_raw() {
        let value = from_host(HostValue::opaque("Socket", Socket));
        match value {
            Value::Raw(raw) => assert_eq!(raw.constructor_name(), "Socket"),
            other => panic!("Expected raw value, got {:?}", other),
        }
    }

    #[test]
    fn test_host_error_keeps_properties() {
        let err = HostError::new("nope").with_property("code", HostValue::Number(7.0));
        match from_host(HostValue::Error(err)) {
            Value::Error(e) => {
                assert_eq!(e.message, "nope");
                assert_eq!(e.properties.get("code"), Some(&Value::Number(7.0)));
            }
            other => panic!("Expected error value, got {:?}", other),
        }
    }

    #[test]
    fn test_json_library() {
        let lib = json_library();
        let parse = &lib.functions[0].1;
        let parsed = parse(vec![HostValue::String("{\"a\": [1, 2]}".into())]).unwrap();
        assert_eq!(parsed.to_json().to_string(), "{\"a\":[1,2]}");
        assert!(parse(vec![HostValue::String("{".into())]).is_err());
    }

    #[test]
    fn test_math_min_max() {
        let lib = math_library();
        let max = lib
            .functions
            .iter()
            .find(|(n, _)| n == "max")
            .map(|(_, f)| f.clone())
            .unwrap();
        let result = max(vec![HostValue::Number(3.0), HostValue::Number(9.0)]).unwrap();
        assert_eq!(result.as_number(), Some(9.0));
    }
}
