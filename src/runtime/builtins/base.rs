//! Output, conversions and error values.

use std::rc::Rc;

use crate::runtime::value::{ErrorValue, NativeFunction, Value};

use super::{arg_error, count_error};

pub fn register(natives: &mut Vec<NativeFunction>) {
    // print(...) - Print values separated by spaces
    natives.push(NativeFunction::new("print", None, |vm, args| {
        let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
        vm.write_line(line.join(" "));
        Ok(Value::Null)
    }));

    // type(value) - Get type name as string
    natives.push(NativeFunction::new("type", Some(1), |_, args| {
        Ok(Value::String(args[0].type_name().to_string()))
    }));

    // string(value) - Display form of a value
    natives.push(NativeFunction::new("string", Some(1), |_, args| {
        Ok(Value::String(args[0].to_string()))
    }));

    // number(value) - Convert to number, null when it cannot be parsed
    natives.push(NativeFunction::new("number", Some(1), |_, args| {
        Ok(match &args[0] {
            Value::Number(n) => Value::Number(*n),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Value::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
            _ => Value::Null,
        })
    }));

    // error(message, properties?) - Construct an error value
    natives.push(NativeFunction::new("error", None, |_, args| {
        let (message, properties) = match args.as_slice() {
            [message] => (message, None),
            [message, props] => (message, Some(props)),
            _ => return Ok(count_error("error", "1 or 2", args.len())),
        };
        let message = match message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let properties = match properties {
            None | Some(Value::Null) => Default::default(),
            Some(Value::Object(obj)) => obj.borrow().fields.clone(),
            Some(other) => return Ok(arg_error("error", "an object of properties", other)),
        };
        Ok(Value::Error(Rc::new(ErrorValue::with_properties(message, properties))))
    }));

    // isError(value) - Whether a value is an error value
    natives.push(NativeFunction::new("isError", Some(1), |_, args| {
        Ok(Value::Bool(args[0].is_error()))
    }));

    // inspect(value) - Detailed description of a value
    natives.push(NativeFunction::new("inspect", Some(1), |_, args| {
        Ok(Value::String(args[0].inspect()))
    }));
}

#[cfg(test)]
mod tests {
    use crate::runtime::value::Value;
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (Value, Vec<String>) {
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        vm.capture_output();
        let value = vm.execute(&module).unwrap();
        (value, vm.output().to_vec())
    }

    #[test]
    fn test_conversions() {
        assert_eq!(run("number(\" 4.5 \")").0, Value::Number(4.5));
        assert_eq!(run("number(\"four\")").0, Value::Null);
        assert_eq!(run("string(12) + string([1])").0, Value::string("12[1]"));
        assert_eq!(run("type({})").0, Value::string("object"));
    }

    #[test]
    fn test_error_values_carry_properties() {
        let (value, _) = run("let e = error(\"bad input\", {code: 400})\n[e.message, e.code, isError(e)]");
        assert_eq!(value.to_string(), "[\"bad input\", 400, true]");
        assert!(run("error(\"x\", 5)").0.is_error());
        assert!(run("error()").0.is_error());
    }

    #[test]
    fn test_error_values_degrade_without_unwinding() {
        let (value, output) = run("let r = 1 + null\nprint(\"still running\")\nisError(r) ? \"degraded\" : \"ok\"");
        assert_eq!(value, Value::string("degraded"));
        assert_eq!(output, vec!["still running".to_string()]);
    }

    #[test]
    fn test_inspect_shows_parameters() {
        let (value, _) = run("let f = (a, b = 1, ...rest) => a\ninspect(f)");
        assert_eq!(value, Value::string("<fn f(a, b = ?, ...rest)>"));
    }
}
