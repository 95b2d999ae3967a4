//! Builtins that look at or reshape functions, objects and the running
//! module: proxies, classes, eval and introspection.

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::value::{Interceptors, NativeFunction, Object, Value};

use super::{arg_error, count_error};

pub fn register(natives: &mut Vec<NativeFunction>) {
    // proxy(object, handler) - Shallow copy of object with get/set interceptors
    natives.push(NativeFunction::new("proxy", Some(2), |_, args| {
        let Value::Object(target) = &args[0] else {
            return Ok(arg_error("proxy", "an object", &args[0]));
        };
        let Value::Object(handler) = &args[1] else {
            return Ok(arg_error("proxy", "a handler object", &args[1]));
        };

        let handler = handler.borrow();
        let interceptors = Interceptors {
            get: interceptor_table(handler.fields.get("get")),
            set: interceptor_table(handler.fields.get("set")),
        };
        let target = target.borrow();
        let copy = Object {
            fields: target.fields.clone(),
            interceptors: (!interceptors.is_empty()).then(|| Rc::new(interceptors)),
            class: target.class.clone(),
        };
        Ok(Value::Object(Rc::new(RefCell::new(copy))))
    }));

    // class(f) - Copy of f whose returned objects are tagged with its name
    natives.push(NativeFunction::new("class", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::Function(closure) => Value::Function(Rc::new(closure.as_class())),
            other => arg_error("class", "a function", other),
        })
    }));

    // eval(code, env?) - Run code in the caller's module, or in a table built from env
    natives.push(NativeFunction::new("eval", None, |vm, args| {
        let (code, env) = match args.as_slice() {
            [code] => (code, None),
            [code, env] => (code, Some(env)),
            _ => return Ok(count_error("eval", "1 or 2", args.len())),
        };
        let Value::String(code) = code else {
            return Ok(arg_error("eval", "a string of code", code));
        };
        match env {
            None | Some(Value::Null) => vm.eval_source(code, None),
            Some(Value::Object(env)) => {
                let fields = env.borrow().fields.clone();
                vm.eval_source(code, Some(&fields))
            }
            Some(other) => Ok(arg_error("eval", "an environment object", other)),
        }
    }));

    // symbols() - Names bound in the caller's module
    natives.push(NativeFunction::new("symbols", Some(0), |vm, _| {
        let names = vm.current_globals().borrow().names();
        Ok(Value::list(names.into_iter().map(Value::String).collect()))
    }));

    // params(f) - Parameter names of a function
    natives.push(NativeFunction::new("params", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::Function(closure) => Value::list(
                closure
                    .proto
                    .param_names()
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
            other => arg_error("params", "a function", other),
        })
    }));

    // isDone(coroutine) - Whether a coroutine has finished
    natives.push(NativeFunction::new("isDone", Some(1), |vm, args| {
        Ok(match &args[0] {
            Value::Coroutine(handle) => Value::Bool(vm.coroutine_done(handle)),
            other => arg_error("isDone", "a coroutine", other),
        })
    }));
}

/// Callable entries of a `get` or `set` handler object.
fn interceptor_table(table: Option<&Value>) -> Vec<(String, Value)> {
    let Some(Value::Object(table)) = table else {
        return Vec::new();
    };
    table
        .borrow()
        .fields
        .iter()
        .filter(|(_, f)| f.is_callable())
        .map(|(name, f)| (name.clone(), f.clone()))
        .collect()
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
    fn test_proxy_doubles_reads_only() {
        let source = r#"
let data = {a: 1, b: 2, c: 3}
let p = proxy(data, {get: {_: (v) => v * 2}})
[p.a, p.c, keys(p), length(p), data.a]
"#;
        assert_eq!(run(source).to_string(), "[2, 6, [\"a\", \"b\", \"c\"], 3, 1]");
    }

    #[test]
    fn test_proxy_is_a_shallow_copy() {
        let source = "let data = {a: 1}\nlet p = proxy(data, {})\np.a = 5\n[data.a, p.a, inspect(p)]";
        assert_eq!(run(source).to_string(), "[1, 5, \"{a: 5}\"]");
        let with_get = "let p = proxy({a: 1}, {get: {a: (v) => v}})\ninspect(p)";
        assert_eq!(run(with_get), Value::string("<proxy> {a: 1}"));
    }

    #[test]
    fn test_introspection() {
        assert_eq!(run("let f = (x, y) => x\nparams(f)").to_string(), "[\"x\", \"y\"]");
        assert_eq!(run("let a = 1\nconst b = 2\nsymbols()").to_string(), "[\"a\", \"b\"]");
        assert!(run("params(1)").is_error());
        assert!(run("isDone(1)").is_error());
    }

    #[test]
    fn test_class_requires_function() {
        assert!(run("class(1)").is_error());
        assert_eq!(run("let P = (x) => { return {x: x} }\ntype(class(P))"), Value::string("function"));
    }

    #[test]
    fn test_eval_argument_checks() {
        assert!(run("eval(1)").is_error());
        assert!(run("eval(\"1\", 2)").is_error());
        assert_eq!(run("eval(\"1 + 1\")"), Value::Number(2.0));
    }
}
