//! Function call dispatch for the VM.

use std::rc::Rc;

use tracing::{trace, warn};

use crate::error::RuntimeError;
use crate::runtime::value::{Closure, NativeFunction, Value};
use crate::span::Span;

use super::chunk::{CaptureSource, Constant, FunctionProto};
use super::vm::{CallFrame, Vm};

/// Deepest call nesting before the VM gives up.
const MAX_FRAMES: usize = 4096;

/// Deepest nesting of dispatch loops started from Rust. Each one holds a
/// native stack frame, so this stays far below `MAX_FRAMES`.
pub(crate) const MAX_NESTED_RUNS: usize = 200;

impl Vm {
    /// Call the value beneath `argc` arguments on the stack. The last
    /// `names.len()` arguments are named.
    ///
    /// Either a new frame is pushed, or the result replaces the callee and
    /// its arguments.
    pub fn call_value(
        &mut self,
        argc: usize,
        names: Option<Rc<[String]>>,
        span: Span,
    ) -> Result<(), RuntimeError> {
        let callee_idx = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow(span))?;
        let callee = self.stack[callee_idx].clone();

        match callee {
            Value::Function(closure) => self.call_closure(closure, callee_idx, names.as_deref(), span),
            Value::Native(native) => self.call_native(&native, callee_idx),
            Value::Coroutine(handle) => {
                // Resume arguments are ignored
                self.stack.truncate(callee_idx);
                self.resume_coroutine(&handle, span)
            }
            other => {
                warn!(line = span.line, callee = %other, "called a value that is not a function");
                self.stack.truncate(callee_idx);
                self.push(Value::Null);
                Ok(())
            }
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        callee_idx: usize,
        names: Option<&[String]>,
        span: Span,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::new(
                format!("Stack overflow calling '{}'", closure.proto.display_name()),
                span,
            ));
        }

        let args = self.stack.split_off(callee_idx + 1);
        let bound = match bind_arguments(&closure, args, names) {
            Ok(bound) => bound,
            Err(message) => {
                warn!(line = span.line, %message, "call failed");
                self.stack.truncate(callee_idx);
                self.push(Value::error(message));
                return Ok(());
            }
        };
        check_parameter_types(&closure.proto, &bound, span)?;

        trace!(function = closure.proto.display_name(), args = bound.len(), "call");

        if closure.proto.is_coroutine {
            self.stack.truncate(callee_idx);
            let handle = self.create_coroutine(closure, bound);
            self.push(handle);
            return Ok(());
        }

        self.stack.extend(bound);
        self.stack.extend(closure.captures.iter().cloned());
        let stamp_class = closure
            .is_class
            .then(|| Rc::from(closure.proto.display_name()));
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            stack_base: callee_idx,
            loops: Vec::new(),
            coroutine: None,
            stamp_class,
        });
        Ok(())
    }

    fn call_native(&mut self, native: &NativeFunction, callee_idx: usize) -> Result<(), RuntimeError> {
        let args = self.stack.split_off(callee_idx + 1);
        self.stack.truncate(callee_idx);

        if let Some(arity) = native.arity {
            if args.len() != arity {
                self.push(Value::error(format!(
                    "{}() expects {} argument(s), got {}",
                    native.name,
                    arity,
                    args.len()
                )));
                return Ok(());
            }
        }

        trace!(native = %native.name, args = args.len(), "native call");
        let result = (native.func)(self, args)?;
        self.push(result);
        Ok(())
    }

    /// Call `name` on the receiver beneath `argc` arguments.
    ///
    /// An object's own field wins. Otherwise a function of that name in
    /// scope is called with the receiver as its first argument.
    pub fn invoke(
        &mut self,
        name: &str,
        argc: usize,
        names: Option<Rc<[String]>>,
        span: Span,
    ) -> Result<(), RuntimeError> {
        let receiver_idx = self
            .stack
            .len()
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow(span))?;
        let receiver = self.stack[receiver_idx].clone();

        if let Value::Object(obj) = &receiver {
            let has_field = obj.borrow().fields.contains_key(name);
            if has_field {
                let method = self.get_property(&receiver, name)?;
                self.stack[receiver_idx] = method;
                return self.call_value(argc, names, span);
            }
        }

        match self.lookup_name(name) {
            Some(func) if func.is_callable() => {
                self.stack.insert(receiver_idx, func);
                self.call_value(argc + 1, names, span)
            }
            _ => {
                warn!(line = span.line, method = name, receiver = receiver.type_name(), "no such method");
                self.stack.truncate(receiver_idx);
                self.push(Value::Null);
                Ok(())
            }
        }
    }

    /// Call a script or native function from Rust and run it to completion.
    pub fn call_function(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.enter_nested_run()?;
        let result = self.call_function_body(callee, args);
        self.nested_runs -= 1;
        result
    }

    /// Count a dispatch loop started from Rust, failing once they nest too deep.
    pub(crate) fn enter_nested_run(&mut self) -> Result<(), RuntimeError> {
        if self.nested_runs >= MAX_NESTED_RUNS {
            let line = self
                .frames
                .last()
                .and_then(|frame| frame.closure.proto.chunk.lines.get(frame.ip.saturating_sub(1)).copied())
                .unwrap_or(0);
            return Err(RuntimeError::new(
                format!("Stack overflow: more than {} nested calls through builtins", MAX_NESTED_RUNS),
                Span::new(0, 0, line, 0),
            ));
        }
        self.nested_runs += 1;
        Ok(())
    }

    fn call_function_body(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let depth = self.frames.len();
        let argc = args.len();
        self.push(callee.clone());
        self.stack.extend(args);
        self.call_value(argc, None, Span::default())?;

        if self.frames.len() > depth {
            self.run(depth)
        } else {
            self.pop(Span::default())
        }
    }

    /// Create a closure from a function constant. Default values and
    /// captured values are copied now.
    pub(crate) fn make_closure(&mut self, proto_idx: u16, defaults: u8, span: Span) -> Result<(), RuntimeError> {
        let proto = match self.constant(proto_idx) {
            Some(Constant::Function(proto)) => proto.clone(),
            _ => return Err(RuntimeError::new("Closure operand is not a function", span)),
        };

        let mut given = self.pop_n(defaults as usize, span)?.into_iter();
        let defaults: Vec<Value> = proto
            .params
            .iter()
            .map(|param| {
                if param.has_default {
                    given.next().unwrap_or(Value::Null)
                } else {
                    Value::Null
                }
            })
            .collect();

        let Some(frame) = self.frames.last() else {
            return Err(RuntimeError::new("No active frame", span));
        };
        let base = frame.stack_base;
        let globals = frame.closure.globals.clone();
        let captures: Vec<Value> = proto
            .captures
            .iter()
            .map(|(_, source)| match source {
                CaptureSource::Local(slot) => self
                    .stack
                    .get(base + *slot as usize)
                    .cloned()
                    .unwrap_or(Value::Null),
                CaptureSource::Global(name) => self.lookup_name(name).unwrap_or(Value::Null),
            })
            .collect();

        self.push(Value::Function(Rc::new(Closure {
            proto,
            captures: Rc::from(captures),
            defaults: Rc::from(defaults),
            globals,
            is_class: false,
        })));
        Ok(())
    }
}

/// Bind call arguments to parameter slots. An `Err` carries the message of
/// the error value the call evaluates to.
fn bind_arguments(closure: &Closure, args: Vec<Value>, names: Option<&[String]>) -> Result<Vec<Value>, String> {
    let proto = &closure.proto;
    let params = &proto.params;
    let names = names.unwrap_or(&[]);
    let positional_count = args.len().saturating_sub(names.len());

    let mut args = args.into_iter();
    let mut positional = args.by_ref().take(positional_count).collect::<Vec<_>>().into_iter();
    let named: Vec<Value> = args.collect();

    let mut bound: Vec<Option<Value>> = vec![None; params.len()];
    let rest = proto.rest_index();
    for slot in bound.iter_mut().take(rest.unwrap_or(params.len())) {
        match positional.next() {
            Some(value) => *slot = Some(value),
            None => break,
        }
    }
    // Surplus positional arguments without a catch-all are dropped
    if let Some(rest) = rest {
        bound[rest] = Some(Value::list(positional.collect()));
    }

    for (name, value) in names.iter().zip(named) {
        let Some(idx) = params.iter().position(|p| p.name == *name) else {
            return Err(format!(
                "'{}' has no parameter named '{}'",
                proto.display_name(),
                name
            ));
        };
        if bound[idx].is_some() && Some(idx) != rest {
            return Err(format!(
                "Parameter '{}' of '{}' given more than once",
                name,
                proto.display_name()
            ));
        }
        bound[idx] = Some(value);
    }

    Ok(bound
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            value.unwrap_or_else(|| closure.defaults.get(i).cloned().unwrap_or(Value::Null))
        })
        .collect())
}

fn check_parameter_types(proto: &FunctionProto, bound: &[Value], span: Span) -> Result<(), RuntimeError> {
    for (param, value) in proto.params.iter().zip(bound) {
        let Some(ty) = &param.ty else {
            continue;
        };
        if !ty.conforms(value) {
            return Err(RuntimeError::SchemaMismatch {
                function: proto.display_name().to_string(),
                param: param.name.clone(),
                expected: ty.to_string(),
                found: value.type_name().to_string(),
                span,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::RuntimeError;
    use crate::runtime::value::Value;
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Result<Value, RuntimeError> {
        let module = crate::compile(source, None).expect("compile error");
        let mut vm = Vm::new();
        vm.capture_output();
        vm.execute(&module)
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_named_and_default_parameters() {
        let source = "let area = (w, h = 2, scale = 1) => w * h * scale\n";
        assert_eq!(run(&format!("{}area(3)", source)).unwrap(), num(6.0));
        assert_eq!(run(&format!("{}area(3, scale: 10)", source)).unwrap(), num(60.0));
        assert_eq!(run(&format!("{}area(h: 5, w: 2)", source)).unwrap(), num(10.0));
        assert_eq!(run(&format!("{}area()", source)).unwrap().type_name(), "error");
    }

    #[test]
    fn test_defaults_are_evaluated_at_definition() {
        let source = "let base = 10\nlet f = (x = base) => x\nbase = 20\nf()";
        assert_eq!(run(source).unwrap(), num(10.0));
    }

    #[test]
    fn test_catch_all_parameter() {
        let source = "let f = (first, ...rest) => [first, rest]\nf(1, 2, 3)";
        let expected = Value::list(vec![num(1.0), Value::list(vec![num(2.0), num(3.0)])]);
        assert_eq!(run(source).unwrap(), expected);
        let empty = run("let f = (first, ...rest) => rest\nf(1)").unwrap();
        assert_eq!(empty, Value::list(vec![]));
    }

    #[test]
    fn test_bad_named_arguments_give_error_values() {
        let source = "let f = (a, b) => a\n";
        assert!(run(&format!("{}f(1, c: 2)", source)).unwrap().is_error());
        assert!(run(&format!("{}f(1, a: 2)", source)).unwrap().is_error());
    }

    #[test]
    fn test_surplus_positional_arguments_are_ignored() {
        assert_eq!(run("let f = (a) => a\nf(1, 2, 3)").unwrap(), num(1.0));
    }

    #[test]
    fn test_parameter_schema_mismatch_is_fatal() {
        let source = "let f = (p :: {x :: number}) => p.x\nlet v = {x: \"no\"}\nf(v)";
        let err = run(source).unwrap_err();
        assert!(matches!(err, RuntimeError::SchemaMismatch { ref param, .. } if param == "p"));
        let ok = "let f = (p :: {x :: number}) => p.x\nlet v = {x: 4, y: 1}\nf(v)";
        assert_eq!(run(ok).unwrap(), num(4.0));
    }

    #[test]
    fn test_closures_capture_by_value() {
        let source = "let x = 1\nlet f = () => x\nx = 2\nf()";
        assert_eq!(run(source).unwrap(), num(1.0));
        let local = "let make = () => { let n = 1; let g = () => n; n = 5; g }\nmake()()";
        assert_eq!(run(local).unwrap(), num(1.0));
    }

    #[test]
    fn test_recursion_through_own_name() {
        let source = "let fact = (n) => n <= 1 ? 1 : n * fact(n - 1)\nfact(6)";
        assert_eq!(run(source).unwrap(), num(720.0));
    }

    #[test]
    fn test_late_bound_globals_resolve_dynamically() {
        let source = r#"
let isEven = (n) => n == 0 ? true : isOdd(n - 1)
let isOdd = (n) => n == 0 ? false : isEven(n - 1)
isEven(10)
"#;
        assert_eq!(run(source).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_calling_a_non_function_gives_null() {
        assert_eq!(run("let x = 3\nx(1)").unwrap(), Value::Null);
        assert_eq!(run("null()").unwrap(), Value::Null);
    }

    #[test]
    fn test_method_call_prefers_field_then_function_in_scope() {
        let source = "let o = {greet: (n) => \"hi \" + n}\no.greet(\"bo\")";
        assert_eq!(run(source).unwrap(), Value::string("hi bo"));
        let ufcs = "let double = (v) => v * 2\nlet n = 4\nn.double()";
        assert_eq!(run(ufcs).unwrap(), num(8.0));
        assert_eq!(run("[1, 2, 3].length()").unwrap(), num(3.0));
    }

    #[test]
    fn test_class_constructor_stamps_result() {
        let source = "let Point = (x, y) => { return {x: x, y: y} }\nlet P = class(Point)\ninspect(P(1, 2))";
        assert_eq!(run(source).unwrap(), Value::string("<instance of Point> {x: 1, y: 2}"));
        let plain = "let Point = (x) => { return {x: x} }\nPoint(1)";
        assert_eq!(run(plain).unwrap().to_string(), "{x: 1}");
    }

    #[test]
    fn test_class_literal_is_named_after_its_binding() {
        let source = "let Pair = class((a, b) => { return {a: a, b: b} })\ninspect(Pair(1, 2))";
        assert_eq!(run(source).unwrap(), Value::string("<instance of Pair> {a: 1, b: 2}"));
        let assigned = "var Unit = null\nUnit = class(() => { return {u: 1} })\ninspect(Unit())";
        assert_eq!(run(assigned).unwrap(), Value::string("<instance of Unit> {u: 1}"));
    }

    #[test]
    fn test_native_arity_mismatch_is_an_error_value() {
        assert!(run("keys()").unwrap().is_error());
    }

    #[test]
    fn test_recursion_through_builtins_is_bounded() {
        // Generous native stack so the limit, not the thread, is what stops it
        let worker = std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(|| {
                let source = "let f = (n) => n == 0 ? 0 : map([n - 1], f)[0]\n";
                let shallow = run(&format!("{}f(50)", source)).map(|v| v.to_string());

                let mut vm = Vm::new();
                let deep = crate::compile(&format!("{}f(4000)", source), None).unwrap();
                let deep = vm.execute(&deep).map(|v| v.to_string());
                let nested_after = vm.nested_runs;
                let after = crate::compile("map([1, 2], (v) => v * 3)", None).unwrap();
                let after = vm.execute(&after).map(|v| v.to_string());
                (shallow, deep, nested_after, after)
            })
            .unwrap();
        let (shallow, deep, nested_after, after) = worker.join().unwrap();
        assert_eq!(shallow.unwrap(), "0");
        let err = deep.unwrap_err();
        assert!(err.to_string().contains("Stack overflow"), "{}", err);
        assert_eq!(nested_after, 0);
        assert_eq!(after.unwrap(), "[3, 6]");
    }
}
