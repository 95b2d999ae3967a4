//! Runtime values for the Lumo VM.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::RuntimeError;
use crate::runtime::interop::HostValue;
use crate::runtime::symbols::SymbolTable;
use crate::vm::chunk::FunctionProto;
use crate::vm::Vm;

/// Ordered field storage for objects and error properties.
pub type FieldMap = IndexMap<String, Value, ahash::RandomState>;

pub fn field_map() -> FieldMap {
    IndexMap::with_hasher(ahash::RandomState::new())
}

/// Wildcard key matching every property in an interceptor table.
pub const WILDCARD: &str = "_";

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    List(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Closure>),
    Native(NativeFunction),
    Coroutine(CoroutineHandle),
    Error(Rc<ErrorValue>),
    Raw(Rc<HostValue>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn object(fields: FieldMap) -> Value {
        Value::Object(Rc::new(RefCell::new(Object::new(fields))))
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Rc::new(ErrorValue::new(message)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
            Value::Coroutine(_) => "coroutine",
            Value::Error(_) => "error",
            Value::Raw(_) => "raw",
        }
    }

    /// `null`, `false`, `0`, `NaN`, `""` and error values are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Error(_) => false,
            _ => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Native(_) | Value::Coroutine(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Non-negative integral number usable as a list or string index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && n.is_finite() => {
                Some(*n as usize)
            }
            _ => None,
        }
    }

    /// Display form used inside collections: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("{:?}", s),
            other => other.to_string(),
        }
    }

    /// Detailed description used by the `inspect` builtin.
    pub fn inspect(&self) -> String {
        match self {
            Value::Object(obj) => {
                let obj = obj.borrow();
                let mut out = String::new();
                if let Some(class) = &obj.class {
                    out.push_str(&format!("<instance of {}> ", class));
                }
                if obj.interceptors.is_some() {
                    out.push_str("<proxy> ");
                }
                out.push_str(&format_fields(&obj.fields));
                out
            }
            Value::Function(closure) => {
                let kind = if closure.is_class {
                    "class"
                } else if closure.proto.is_coroutine {
                    "coroutine fn"
                } else {
                    "fn"
                };
                let params: Vec<String> = closure
                    .proto
                    .params
                    .iter()
                    .map(|p| {
                        let mut s = if p.is_rest {
                            format!("...{}", p.name)
                        } else {
                            p.name.clone()
                        };
                        if let Some(ty) = &p.ty {
                            s.push_str(&format!(" :: {}", ty));
                        }
                        if p.has_default {
                            s.push_str(" = ?");
                        }
                        s
                    })
                    .collect();
                format!(
                    "<{} {}({})>",
                    kind,
                    closure.proto.display_name(),
                    params.join(", ")
                )
            }
            Value::Error(err) if !err.properties.is_empty() => {
                format!("Error: {} {}", err.message, format_fields(&err.properties))
            }
            Value::String(_) => self.repr(),
            other => other.to_string(),
        }
    }
}

/// Render a number the way scripts see it: integral values have no `.0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn format_fields(fields: &FieldMap) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v.repr()))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a_ref = a.borrow();
                let b_ref = b.borrow();
                a_ref.len() == b_ref.len() && a_ref.iter().zip(b_ref.iter()).all(|(x, y)| x == y)
            }
            (Value::Object(a), Value::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a_ref = a.borrow();
                let b_ref = b.borrow();
                a_ref.fields.len() == b_ref.fields.len()
                    && a_ref
                        .fields
                        .iter()
                        .all(|(k, v)| b_ref.fields.get(k) == Some(v))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Value::Coroutine(a), Value::Coroutine(b)) => Rc::ptr_eq(&a.token, &b.token),
            (Value::Error(a), Value::Error(b)) => a.message == b.message,
            (Value::Raw(a), Value::Raw(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                let obj = obj.borrow();
                if let Some(class) = &obj.class {
                    write!(f, "{} ", class)?;
                }
                write!(f, "{}", format_fields(&obj.fields))
            }
            Value::Function(closure) => {
                if closure.is_class {
                    write!(f, "<class {}>", closure.proto.display_name())
                } else {
                    write!(f, "<fn {}>", closure.proto.display_name())
                }
            }
            Value::Native(native) => write!(f, "<native fn {}>", native.name),
            Value::Coroutine(handle) => write!(f, "<coroutine {}>", handle.name),
            Value::Error(err) => write!(f, "Error: {}", err.message),
            Value::Raw(raw) => write!(f, "<raw {}>", raw.constructor_name()),
        }
    }
}

/// Get/set interceptor functions attached to a proxied object, keyed by
/// property name or [`WILDCARD`].
#[derive(Debug, Clone, Default)]
pub struct Interceptors {
    pub get: Vec<(String, Value)>,
    pub set: Vec<(String, Value)>,
}

impl Interceptors {
    pub fn getter(&self, name: &str) -> Option<&Value> {
        lookup_interceptor(&self.get, name)
    }

    pub fn setter(&self, name: &str) -> Option<&Value> {
        lookup_interceptor(&self.set, name)
    }

    pub fn is_empty(&self) -> bool {
        self.get.is_empty() && self.set.is_empty()
    }
}

fn lookup_interceptor<'a>(table: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    table
        .iter()
        .find(|(k, _)| k == name)
        .or_else(|| table.iter().find(|(k, _)| k == WILDCARD))
        .map(|(_, v)| v)
}

/// An object: ordered fields plus optional proxy and class metadata.
#[derive(Debug, Clone)]
pub struct Object {
    pub fields: FieldMap,
    pub interceptors: Option<Rc<Interceptors>>,
    /// Name of the class constructor that produced this object.
    pub class: Option<Rc<str>>,
}

impl Object {
    pub fn new(fields: FieldMap) -> Self {
        Self {
            fields,
            interceptors: None,
            class: None,
        }
    }
}

/// A function literal evaluated at runtime.
pub struct Closure {
    pub proto: Rc<FunctionProto>,
    /// Captured values, in the proto's capture order.
    pub captures: Rc<[Value]>,
    /// Default values aligned with the parameters (`Null` where none).
    pub defaults: Rc<[Value]>,
    /// The module the literal was evaluated in.
    pub globals: Rc<RefCell<SymbolTable>>,
    /// Acts as a class constructor: returned objects get tagged.
    pub is_class: bool,
}

impl Closure {
    /// Same closure, flagged as a class constructor.
    pub fn as_class(&self) -> Closure {
        Closure {
            proto: self.proto.clone(),
            captures: self.captures.clone(),
            defaults: self.defaults.clone(),
            globals: self.globals.clone(),
            is_class: true,
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({})", self.proto.display_name())
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Vm, Vec<Value>) -> Result<Value, RuntimeError>>;

/// A function implemented in Rust.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    /// `None` means variadic.
    pub arity: Option<usize>,
    pub func: NativeFn,
    /// VM builtin, as opposed to a function loaded from a host library.
    pub builtin: bool,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, arity: Option<usize>, func: F) -> Self
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            func: Rc::new(func),
            builtin: true,
        }
    }

    pub fn host<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        Self {
            builtin: false,
            ..Self::new(name, None, func)
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// Handle to a suspended activation in the VM's coroutine arena.
///
/// The arena slot `id` belongs to this handle only while its generation
/// matches. The arena reclaims the slot once every clone of `token` is gone.
#[derive(Debug, Clone)]
pub struct CoroutineHandle {
    pub id: usize,
    pub generation: u32,
    pub name: Rc<str>,
    pub token: Rc<()>,
}

/// Payload of an error value.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub message: String,
    pub properties: FieldMap,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            properties: field_map(),
        }
    }

    pub fn with_properties(message: impl Into<String>, properties: FieldMap) -> Self {
        Self {
            message: message.into(),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_display() {
        let list = Value::list(vec![Value::Number(1.0), Value::string("a")]);
        assert_eq!(list.to_string(), "[1, \"a\"]");

        let mut fields = field_map();
        fields.insert("x".to_string(), Value::Number(1.0));
        let obj = Value::object(fields);
        assert_eq!(obj.to_string(), "{x: 1}");
        if let Value::Object(o) = &obj {
            o.borrow_mut().class = Some("Point".into());
        }
        assert_eq!(obj.to_string(), "Point {x: 1}");

        assert_eq!(Value::error("boom").to_string(), "Error: boom");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::error("x").is_truthy());
        assert!(Value::list(vec![]).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
    }

    #[test]
    fn test_interceptor_lookup_prefers_named() {
        let interceptors = Interceptors {
            get: vec![
                (WILDCARD.to_string(), Value::Number(1.0)),
                ("a".to_string(), Value::Number(2.0)),
            ],
            set: vec![],
        };
        assert_eq!(interceptors.getter("a"), Some(&Value::Number(2.0)));
        assert_eq!(interceptors.getter("b"), Some(&Value::Number(1.0)));
        assert_eq!(interceptors.setter("a"), None);
    }
}
