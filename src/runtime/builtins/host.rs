//! Host interop builtins: library loading, host calls and raw values.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::runtime::interop::{from_host, host_error_value, to_host, HostValue};
use crate::runtime::value::{NativeFunction, Value};
use crate::vm::Vm;

use super::{arg_error, count_error};

pub fn register(natives: &mut Vec<NativeFunction>) {
    // loadLib(name) - Object of the functions of a registered host library
    natives.push(NativeFunction::new("loadLib", Some(1), |vm, args| {
        let Value::String(name) = &args[0] else {
            return Ok(arg_error("loadLib", "a library name", &args[0]));
        };
        Ok(match vm.libraries.get(name) {
            Some(library) => library.to_value(),
            None => Value::error(format!("Unknown host library '{}'", name)),
        })
    }));

    // run(f, args...) - Call a host function, converting the result back
    natives.push(NativeFunction::new("run", None, |vm, args| {
        call_host(vm, "run", args, false)
    }));

    // runRaw(f, args...) - Call a host function, keeping the result raw
    natives.push(NativeFunction::new("runRaw", None, |vm, args| {
        call_host(vm, "runRaw", args, true)
    }));

    // raw(value) - Host form of a value
    natives.push(NativeFunction::new("raw", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::Raw(_) => args[0].clone(),
            other => Value::Raw(Rc::new(to_host(other))),
        })
    }));

    // value(raw) - Script form of a raw value
    natives.push(NativeFunction::new("value", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::Raw(raw) => from_host((**raw).clone()),
            other => other.clone(),
        })
    }));
}

fn call_host(vm: &mut Vm, name: &str, args: Vec<Value>, keep_raw: bool) -> Result<Value, RuntimeError> {
    let mut args = args.into_iter();
    let Some(callee) = args.next() else {
        return Ok(count_error(name, "at least 1", 0));
    };
    let args: Vec<Value> = args.collect();

    match &callee {
        Value::Native(native) if !native.builtin => {
            let result = vm.call_function(&callee, args)?;
            Ok(if keep_raw && !result.is_error() {
                Value::Raw(Rc::new(to_host(&result)))
            } else {
                result
            })
        }
        Value::Raw(raw) => match &**raw {
            HostValue::Function(_, func) => {
                let host_args = args.iter().map(to_host).collect();
                Ok(match func(host_args) {
                    Ok(result) if keep_raw => Value::Raw(Rc::new(result)),
                    Ok(result) => from_host(result),
                    Err(err) => host_error_value(err),
                })
            }
            _ => Ok(arg_error(name, "a host function", &callee)),
        },
        other => Ok(arg_error(name, "a host function", other)),
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::interop::{HostError, HostLibrary, HostValue};
    use crate::runtime::value::Value;
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;

    struct Counter(u32);

    fn run_with(vm: &mut Vm, source: &str) -> Value {
        let module = crate::compile(source, None).unwrap();
        vm.execute(&module).unwrap()
    }

    fn run(source: &str) -> Value {
        run_with(&mut Vm::new(), source)
    }

    #[test]
    fn test_builtin_host_libraries() {
        let source = r#"
let json = loadLib("json")
let math = loadLib("math")
let data = json.parse("{\"xs\": [3, 1, 2]}")
[math.max(data.xs), json.stringify({a: [1, true]}), math.sqrt(16)]
"#;
        assert_eq!(run(source).to_string(), "[3, \"{\\\"a\\\":[1,true]}\", 4]");
    }

    #[test]
    fn test_host_errors_become_error_values() {
        let source = "let json = loadLib(\"json\")\nlet e = json.parse(\"{\")\n[isError(e), e.line]";
        assert_eq!(run(source).to_string(), "[true, 1]");
        assert!(run("loadLib(\"nope\")").is_error());
    }

    #[test]
    fn test_registered_library_with_opaque_values() {
        let mut vm = Vm::new();
        vm.register_library(
            HostLibrary::new("counter")
                .function("make", |_| Ok(HostValue::opaque("Counter", Counter(41))))
                .function("read", |args| match args.first() {
                    Some(HostValue::Opaque { value, .. }) => value
                        .downcast_ref::<Counter>()
                        .map(|c| HostValue::Number(c.0 as f64 + 1.0))
                        .ok_or_else(|| HostError::new("not a counter")),
                    _ => Err(HostError::new("read() expects a counter")),
                }),
        );
        let source = r#"
let lib = loadLib("counter")
let c = lib.make()
[string(c), lib.read(c), isError(lib.read(1))]
"#;
        assert_eq!(run_with(&mut vm, source).to_string(), "[\"<raw Counter>\", 42, true]");
    }

    #[test]
    fn test_run_and_raw_values() {
        let source = r#"
let math = loadLib("math")
let kept = runRaw(math.abs, -3)
[run(math.abs, -3), type(kept), value(kept), value(raw([1, 2])), isError(run(print, 1))]
"#;
        assert_eq!(run(source).to_string(), "[3, \"raw\", 3, [1, 2], true]");
    }
}
