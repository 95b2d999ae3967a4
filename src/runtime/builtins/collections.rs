//! List and object builtins, including the higher-order list operations.

use crate::error::RuntimeError;
use crate::runtime::value::{NativeFunction, Value};
use crate::vm::Vm;

use super::{arg_error, count_error};

pub fn register(natives: &mut Vec<NativeFunction>) {
    // length(list|string|object) - Element, character or key count
    natives.push(NativeFunction::new("length", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::List(items) => Value::Number(items.borrow().len() as f64),
            Value::String(s) => Value::Number(s.chars().count() as f64),
            Value::Object(obj) => Value::Number(obj.borrow().fields.len() as f64),
            other => arg_error("length", "a list, string or object", other),
        })
    }));

    // keys(object) - Field names in order
    natives.push(NativeFunction::new("keys", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::Object(obj) => Value::list(
                obj.borrow()
                    .fields
                    .keys()
                    .map(|k| Value::String(k.clone()))
                    .collect(),
            ),
            other => arg_error("keys", "an object", other),
        })
    }));

    // append(list, values...) - Append in place, returns the list
    natives.push(NativeFunction::new("append", None, |_, args| {
        let mut args = args.into_iter();
        match args.next() {
            Some(Value::List(items)) => {
                items.borrow_mut().extend(args);
                Ok(Value::List(items))
            }
            Some(other) => Ok(arg_error("append", "a list", &other)),
            None => Ok(count_error("append", "at least 1", 0)),
        }
    }));

    // insert(list, index, value) - Insert in place, returns the list
    natives.push(NativeFunction::new("insert", Some(3), |_, args| {
        let Value::List(items) = &args[0] else {
            return Ok(arg_error("insert", "a list", &args[0]));
        };
        let len = items.borrow().len();
        match args[1].as_index() {
            Some(i) if i <= len => {
                items.borrow_mut().insert(i, args[2].clone());
                Ok(args[0].clone())
            }
            _ => Ok(Value::error(format!(
                "insert() index {} out of range for length {}",
                args[1].repr(),
                len
            ))),
        }
    }));

    // remove(list, index) / remove(object, key) - Remove and return an element
    natives.push(NativeFunction::new("remove", Some(2), |_, args| {
        Ok(match (&args[0], &args[1]) {
            (Value::List(items), index) => {
                let mut items = items.borrow_mut();
                match index.as_index() {
                    Some(i) if i < items.len() => items.remove(i),
                    _ => Value::error(format!(
                        "remove() index {} out of range for length {}",
                        index.repr(),
                        items.len()
                    )),
                }
            }
            (Value::Object(obj), Value::String(key)) => obj
                .borrow_mut()
                .fields
                .shift_remove(key)
                .unwrap_or(Value::Null),
            (Value::Object(_), other) => arg_error("remove", "a string key", other),
            (other, _) => arg_error("remove", "a list or object", other),
        })
    }));

    // pop(list) - Remove and return the last element
    natives.push(NativeFunction::new("pop", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::List(items) => items.borrow_mut().pop().unwrap_or(Value::Null),
            other => arg_error("pop", "a list", other),
        })
    }));

    // map(list, f) - New list of f(value, index)
    natives.push(NativeFunction::new("map", Some(2), |vm, args| {
        let Some(items) = snapshot(&args[0]) else {
            return Ok(arg_error("map", "a list", &args[0]));
        };
        let mut mapped = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            mapped.push(call_with_index(vm, &args[1], item, i)?);
        }
        Ok(Value::list(mapped))
    }));

    // filter(list, f) - Elements for which f(value, index) is truthy
    natives.push(NativeFunction::new("filter", Some(2), |vm, args| {
        let Some(items) = snapshot(&args[0]) else {
            return Ok(arg_error("filter", "a list", &args[0]));
        };
        let mut kept = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if call_with_index(vm, &args[1], item.clone(), i)?.is_truthy() {
                kept.push(item);
            }
        }
        Ok(Value::list(kept))
    }));

    // forEach(list, f) - Call f(value, index) for every element
    natives.push(NativeFunction::new("forEach", Some(2), |vm, args| {
        let Some(items) = snapshot(&args[0]) else {
            return Ok(arg_error("forEach", "a list", &args[0]));
        };
        for (i, item) in items.into_iter().enumerate() {
            call_with_index(vm, &args[1], item, i)?;
        }
        Ok(Value::Null)
    }));
}

fn snapshot(list: &Value) -> Option<Vec<Value>> {
    match list {
        Value::List(items) => Some(items.borrow().clone()),
        _ => None,
    }
}

/// Call `f(value, index)`. A native taking exactly one argument only gets
/// the value.
fn call_with_index(vm: &mut Vm, f: &Value, item: Value, index: usize) -> Result<Value, RuntimeError> {
    let args = match f {
        Value::Native(native) if native.arity == Some(1) => vec![item],
        _ => vec![item, Value::Number(index as f64)],
    };
    vm.call_function(f, args)
}

#[cfg(test)]
mod tests {
    use crate::runtime::value::Value;
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Value {
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        vm.capture_output();
        vm.execute(&module).unwrap()
    }

    #[test]
    fn test_higher_order_functions() {
        assert_eq!(run("map([1, 2, 3], (v) => v * v)").to_string(), "[1, 4, 9]");
        assert_eq!(run("map([5, 6], (v, i) => i)").to_string(), "[0, 1]");
        assert_eq!(run("filter([1, 2, 3, 4], (v) => v % 2 == 0)").to_string(), "[2, 4]");
        assert_eq!(run("map([1, 2], string)").to_string(), "[\"1\", \"2\"]");
        assert_eq!(run("[1, 2, 3].map((v) => v + 1)").to_string(), "[2, 3, 4]");
    }

    #[test]
    fn test_for_each_sees_enclosing_objects() {
        let source = "let acc = {sum: 0}\nforEach([1, 2, 3], (v) => { acc.sum += v })\nacc.sum";
        assert_eq!(run(source), Value::Number(6.0));
    }

    #[test]
    fn test_list_mutation() {
        let source = r#"
let l = [1, 2]
append(l, 3, 4)
insert(l, 0, 0)
let removed = remove(l, 1)
let last = pop(l)
[l, removed, last]
"#;
        assert_eq!(run(source).to_string(), "[[0, 2, 3], 1, 4]");
        assert!(run("insert([1], 5, 0)").is_error());
        assert!(run("remove([], 0)").is_error());
        assert_eq!(run("pop([])"), Value::Null);
    }

    #[test]
    fn test_object_keys_and_remove() {
        let source = "let o = {b: 1, a: 2, c: 3}\nlet v = remove(o, \"a\")\n[keys(o), v, length(o)]";
        assert_eq!(run(source).to_string(), "[[\"b\", \"c\"], 2, 2]");
        assert!(run("keys([1])").is_error());
        assert!(run("length(5)").is_error());
    }
}
