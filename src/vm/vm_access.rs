//! Property and index access, including proxy interceptors.

use crate::error::RuntimeError;
use crate::runtime::value::Value;

use super::vm::Vm;

impl Vm {
    /// Read `target.name`. Reads of a proxied object go through its getter.
    pub fn get_property(&mut self, target: &Value, name: &str) -> Result<Value, RuntimeError> {
        match target {
            Value::Object(obj) => {
                let (raw, getter) = {
                    let obj = obj.borrow();
                    let raw = obj.fields.get(name).cloned().unwrap_or(Value::Null);
                    let getter = obj
                        .interceptors
                        .as_ref()
                        .and_then(|table| table.getter(name).cloned());
                    (raw, getter)
                };
                match getter {
                    Some(getter) => self.call_function(&getter, vec![raw]),
                    None => Ok(raw),
                }
            }
            Value::List(items) if name == "length" => Ok(Value::Number(items.borrow().len() as f64)),
            Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Error(err) if name == "message" => Ok(Value::String(err.message.clone())),
            Value::Error(err) => Ok(err.properties.get(name).cloned().unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }

    /// Write `target.name = value` and return the stored value. A proxy
    /// setter receives `(new, old)` and its result is what gets stored.
    pub fn set_property(&mut self, target: &Value, name: &str, value: Value) -> Result<Value, RuntimeError> {
        let Value::Object(obj) = target else {
            return Ok(Value::error(format!(
                "Cannot set property '{}' on {}",
                name,
                target.type_name()
            )));
        };

        let (old, setter) = {
            let obj = obj.borrow();
            let old = obj.fields.get(name).cloned().unwrap_or(Value::Null);
            let setter = obj
                .interceptors
                .as_ref()
                .and_then(|table| table.setter(name).cloned());
            (old, setter)
        };
        let stored = match setter {
            Some(setter) => self.call_function(&setter, vec![value, old])?,
            None => value,
        };
        obj.borrow_mut().fields.insert(name.to_string(), stored.clone());
        Ok(stored)
    }

    /// Read `target[index]`. Mismatched or out-of-range reads give `null`.
    pub fn get_index(&mut self, target: &Value, index: &Value) -> Result<Value, RuntimeError> {
        match (target, index) {
            (Value::List(items), _) => Ok(index
                .as_index()
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Null)),
            (Value::String(s), _) => Ok(index
                .as_index()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null)),
            (Value::Object(_), Value::String(key)) => self.get_property(target, key),
            _ => Ok(Value::Null),
        }
    }

    /// Write `target[index] = value`. A list may grow by one element at a
    /// time.
    pub fn set_index(&mut self, target: &Value, index: &Value, value: Value) -> Result<Value, RuntimeError> {
        match (target, index) {
            (Value::List(items), _) => {
                let Some(i) = index.as_index() else {
                    return Ok(Value::error(format!("Invalid list index {}", index.repr())));
                };
                let mut items = items.borrow_mut();
                let len = items.len();
                if i < len {
                    items[i] = value.clone();
                } else if i == len {
                    items.push(value.clone());
                } else {
                    return Ok(Value::error(format!(
                        "List index {} out of range for length {}",
                        i, len
                    )));
                }
                Ok(value)
            }
            (Value::Object(_), Value::String(key)) => self.set_property(target, key, value),
            _ => Ok(Value::error(format!(
                "Cannot index-assign {} with {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::value::{field_map, Value};
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;

    fn object(pairs: &[(&str, Value)]) -> Value {
        let mut fields = field_map();
        for (k, v) in pairs {
            fields.insert(k.to_string(), v.clone());
        }
        Value::object(fields)
    }

    #[test]
    fn test_list_grows_by_one() {
        let mut vm = Vm::new();
        let list = Value::list(vec![Value::Number(1.0)]);
        let stored = vm.set_index(&list, &Value::Number(1.0), Value::Number(2.0)).unwrap();
        assert_eq!(stored, Value::Number(2.0));
        assert!(vm.set_index(&list, &Value::Number(3.0), Value::Null).unwrap().is_error());
        assert!(vm.set_index(&list, &Value::Number(-1.0), Value::Null).unwrap().is_error());
        assert_eq!(list.to_string(), "[1, 2]");
    }

    #[test]
    fn test_object_index_by_string_key() {
        let mut vm = Vm::new();
        let obj = object(&[("a", Value::Number(1.0))]);
        assert_eq!(vm.get_index(&obj, &Value::string("a")).unwrap(), Value::Number(1.0));
        assert_eq!(vm.get_index(&obj, &Value::Number(0.0)).unwrap(), Value::Null);
        vm.set_index(&obj, &Value::string("b"), Value::Bool(true)).unwrap();
        assert_eq!(obj.to_string(), "{a: 1, b: true}");
    }

    #[test]
    fn test_length_and_error_properties() {
        let mut vm = Vm::new();
        assert_eq!(
            vm.get_property(&Value::string("héllo"), "length").unwrap(),
            Value::Number(5.0)
        );
        let err = Value::error("boom");
        assert_eq!(vm.get_property(&err, "message").unwrap(), Value::string("boom"));
        assert_eq!(vm.get_property(&Value::Number(1.0), "x").unwrap(), Value::Null);
    }

    #[test]
    fn test_proxy_setter_result_is_stored() {
        let source = r#"
let p = proxy({n: 1}, {set: {n: (next, old) => next + old}})
p.n = 10
p.n = 100
p.n
"#;
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&module).unwrap(), Value::Number(111.0));
    }

    #[test]
    fn test_proxy_getter_receives_raw_value() {
        let source = r#"
let p = proxy({a: 1, b: 2}, {get: {_: (v) => v * 2, b: (v) => v + 100}})
[p.a, p["b"], keys(p), length(p)]
"#;
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        let result = vm.execute(&module).unwrap();
        assert_eq!(result.to_string(), "[2, 102, [\"a\", \"b\"], 2]");
    }
}
