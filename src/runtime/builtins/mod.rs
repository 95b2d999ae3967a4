//! Built-in functions for Lumo.
//!
//! A builtin given arguments of the wrong count or type returns an error
//! value rather than failing the run.

use crate::runtime::value::{NativeFunction, Value};

mod base;
mod collections;
mod host;
mod reflect;

/// Every builtin, in registration order.
pub fn all() -> Vec<NativeFunction> {
    let mut natives = Vec::new();
    base::register(&mut natives);
    collections::register(&mut natives);
    reflect::register(&mut natives);
    host::register(&mut natives);
    natives
}

/// Error value for an argument of the wrong type.
pub(crate) fn arg_error(func: &str, expected: &str, got: &Value) -> Value {
    Value::error(format!(
        "{}() expects {}, got {}",
        func,
        expected,
        got.type_name()
    ))
}

/// Error value for a variadic builtin called with too few or too many
/// arguments.
pub(crate) fn count_error(func: &str, expected: &str, got: usize) -> Value {
    Value::error(format!(
        "{}() expects {} argument(s), got {}",
        func, expected, got
    ))
}
