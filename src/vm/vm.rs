//! The bytecode virtual machine: stack-based execution engine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::ast::BinaryOp;
use crate::error::RuntimeError;
use crate::module::ModuleResolver;
use crate::runtime::builtins;
use crate::runtime::interop::{json_library, math_library, HostLibrary};
use crate::runtime::symbols::SymbolTable;
use crate::runtime::value::{field_map, Closure, Value};
use crate::span::Span;

use super::chunk::{CompiledModule, Constant};
use super::opcode::Op;
use super::vm_coroutines::CoroutineArena;

/// Position of a `for` loop within its items snapshot.
#[derive(Debug, Clone)]
pub struct ForState {
    pub items: Vec<Value>,
    pub next: usize,
}

/// An active loop of a frame.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub continue_at: usize,
    pub exit_at: usize,
    /// Stack height above the frame base when the loop was entered.
    pub stack_depth: usize,
    pub iter: Option<ForState>,
}

/// A call frame on the VM call stack.
#[derive(Clone)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: Rc<Closure>,
    /// Instruction pointer (index into chunk.code).
    pub ip: usize,
    /// Base index into the value stack for this frame's slots.
    pub stack_base: usize,
    /// Loops entered and not yet left, innermost last.
    pub loops: Vec<LoopContext>,
    /// Arena index when this frame runs a coroutine.
    pub coroutine: Option<usize>,
    /// Class name stamped onto an object returned by this frame.
    pub stamp_class: Option<Rc<str>>,
}

/// The bytecode VM.
pub struct Vm {
    /// Value stack.
    pub stack: Vec<Value>,
    /// Call frame stack.
    pub frames: Vec<CallFrame>,
    /// Symbols of the main script.
    pub globals: Rc<RefCell<SymbolTable>>,
    /// Builtin functions, consulted after module symbols.
    pub builtins: HashMap<String, Value>,
    /// Suspended and finished coroutine activations.
    pub coroutines: CoroutineArena,
    /// Loaded modules and the import chain.
    pub modules: ModuleResolver,
    /// Host libraries available to `loadLib`.
    pub libraries: HashMap<String, HostLibrary>,
    /// Dispatch loops currently started from Rust: natives calling back
    /// into script code, `eval` and `import`.
    pub(crate) nested_runs: usize,
    /// Captured print output, when capturing is enabled.
    output: Option<Vec<String>>,
}

impl Vm {
    pub fn new() -> Self {
        let mut vm = Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(64),
            globals: Rc::new(RefCell::new(SymbolTable::new())),
            builtins: HashMap::new(),
            coroutines: CoroutineArena::new(),
            modules: ModuleResolver::new(),
            libraries: HashMap::new(),
            nested_runs: 0,
            output: None,
        };
        for native in builtins::all() {
            vm.builtins.insert(native.name.clone(), Value::Native(native));
        }
        vm.register_library(json_library());
        vm.register_library(math_library());
        vm
    }

    /// Make a host library loadable with `loadLib(name)`.
    pub fn register_library(&mut self, library: HostLibrary) {
        self.libraries.insert(library.name.clone(), library);
    }

    /// Send `print` output to an in-memory buffer instead of stdout.
    pub fn capture_output(&mut self) {
        self.output.get_or_insert_with(Vec::new);
    }

    /// Lines printed since capturing was enabled.
    pub fn output(&self) -> &[String] {
        self.output.as_deref().unwrap_or(&[])
    }

    pub fn write_line(&mut self, line: String) {
        match &mut self.output {
            Some(buffer) => buffer.push(line),
            None => println!("{}", line),
        }
    }

    /// Execute a compiled script against the VM's main module table.
    pub fn execute(&mut self, module: &CompiledModule) -> Result<Value, RuntimeError> {
        let path = module
            .main
            .source_path
            .as_ref()
            .and_then(|p| crate::module::canonicalize(p).ok());
        // Re-entering the script through an import is a cycle
        let entered = path.filter(|path| match self.modules.enter(path) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "script already loading");
                false
            }
        });

        let globals = self.globals.clone();
        let result = self.run_module(module, globals);

        if let Some(path) = &entered {
            self.modules.leave(path, None);
        }
        if result.is_err() {
            self.stack.clear();
            self.frames.clear();
            self.coroutines.release_running();
        }
        result
    }

    /// Run a compiled unit to completion in the given module table.
    pub fn run_module(
        &mut self,
        module: &CompiledModule,
        globals: Rc<RefCell<SymbolTable>>,
    ) -> Result<Value, RuntimeError> {
        self.enter_nested_run()?;
        let result = self.run_module_body(module, globals);
        self.nested_runs -= 1;
        result
    }

    fn run_module_body(
        &mut self,
        module: &CompiledModule,
        globals: Rc<RefCell<SymbolTable>>,
    ) -> Result<Value, RuntimeError> {
        let closure = Rc::new(Closure {
            proto: module.main.clone(),
            captures: Rc::from(Vec::new()),
            defaults: Rc::from(Vec::new()),
            globals,
            is_class: false,
        });
        let stack_base = self.stack.len();
        self.push(Value::Function(closure.clone()));

        let stop_depth = self.frames.len();
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            stack_base,
            loops: Vec::new(),
            coroutine: None,
            stamp_class: None,
        });
        self.run(stop_depth)
    }

    /// Run the dispatch loop until the frame count drops back to `stop_depth`.
    pub fn run(&mut self, stop_depth: usize) -> Result<Value, RuntimeError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Value::Null);
            };
            let chunk = &frame.closure.proto.chunk;
            let ip = frame.ip;
            let Some(&op) = chunk.code.get(ip) else {
                return Err(RuntimeError::new(
                    format!(
                        "Instruction pointer {} out of range in '{}'",
                        ip,
                        frame.closure.proto.display_name()
                    ),
                    Span::default(),
                ));
            };
            let line = chunk.lines.get(ip).copied().unwrap_or(0);
            let span = Span::new(0, 0, line, 0);
            let stack_base = frame.stack_base;

            // Advance IP
            frame.ip += 1;

            match op {
                Op::Constant(idx) => {
                    let value = match self.constant(idx) {
                        Some(Constant::Number(n)) => Value::Number(*n),
                        Some(Constant::String(s)) => Value::String(s.clone()),
                        _ => Value::Null,
                    };
                    self.push(value);
                }
                Op::Null => self.push(Value::Null),
                Op::True => self.push(Value::Bool(true)),
                Op::False => self.push(Value::Bool(false)),

                Op::Pop => {
                    if let Value::Error(err) = self.pop(span)? {
                        warn!(line, error = %err.message, "discarded error value");
                    }
                }
                Op::PopN(n) => {
                    let len = self.stack.len().saturating_sub(n as usize);
                    self.stack.truncate(len);
                }
                Op::Dup => {
                    let value = self.peek(0, span)?.clone();
                    self.push(value);
                }
                Op::Dup2 => {
                    let a = self.peek(1, span)?.clone();
                    let b = self.peek(0, span)?.clone();
                    self.push(a);
                    self.push(b);
                }

                Op::GetLocal(slot) => {
                    let value = self.slot(stack_base, slot, span)?.clone();
                    self.push(value);
                }
                Op::SetLocal(slot) => {
                    let value = self.peek(0, span)?.clone();
                    *self.slot_mut(stack_base, slot, span)? = value;
                }
                Op::UpdateLocal(slot, op) => {
                    let rhs = self.pop(span)?;
                    let current = self.slot(stack_base, slot, span)?.clone();
                    let result = binary_op(op, current, rhs);
                    *self.slot_mut(stack_base, slot, span)? = result.clone();
                    self.push(result);
                }
                Op::GetGlobal(idx) => {
                    let name = self.string_constant(idx);
                    let value = self
                        .lookup_name(&name)
                        .unwrap_or_else(|| Value::error(format!("Undefined variable '{}'", name)));
                    self.push(value);
                }
                Op::SetGlobal(idx) => {
                    let name = self.string_constant(idx);
                    let value = self.pop(span)?;
                    let globals = self.current_globals();
                    let result = globals.borrow_mut().assign(&name, value.clone());
                    match result {
                        Ok(()) => self.push(value),
                        Err(err) => self.push(Value::error(err.to_string())),
                    }
                }
                Op::DefineGlobal(idx, kind) => {
                    let name = self.string_constant(idx);
                    let value = self.pop(span)?;
                    let globals = self.current_globals();
                    let result = globals.borrow_mut().declare(&name, value.clone(), kind);
                    match result {
                        Ok(()) => self.push(value),
                        Err(err) => self.push(Value::error(err.to_string())),
                    }
                }

                // --- Arithmetic & comparison ---
                Op::Add => self.binary(BinaryOp::Add, span)?,
                Op::Subtract => self.binary(BinaryOp::Subtract, span)?,
                Op::Multiply => self.binary(BinaryOp::Multiply, span)?,
                Op::Divide => self.binary(BinaryOp::Divide, span)?,
                Op::Modulo => self.binary(BinaryOp::Modulo, span)?,
                Op::Power => self.binary(BinaryOp::Power, span)?,
                Op::Equal => self.binary(BinaryOp::Equal, span)?,
                Op::NotEqual => self.binary(BinaryOp::NotEqual, span)?,
                Op::Less => self.binary(BinaryOp::Less, span)?,
                Op::LessEqual => self.binary(BinaryOp::LessEqual, span)?,
                Op::Greater => self.binary(BinaryOp::Greater, span)?,
                Op::GreaterEqual => self.binary(BinaryOp::GreaterEqual, span)?,
                Op::Negate => {
                    let value = self.pop(span)?;
                    let result = match value {
                        Value::Number(n) => Value::Number(-n),
                        other => Value::error(format!("Cannot negate {}", other.type_name())),
                    };
                    self.push(result);
                }
                Op::Not => {
                    let value = self.pop(span)?;
                    self.push(Value::Bool(!value.is_truthy()));
                }

                // --- Control flow ---
                Op::Jump(target) => self.jump(target),
                Op::JumpIfFalse(target) => {
                    if !self.pop(span)?.is_truthy() {
                        self.jump(target);
                    }
                }
                Op::JumpIfFalseNoPop(target) => {
                    if !self.peek(0, span)?.is_truthy() {
                        self.jump(target);
                    }
                }
                Op::JumpIfTrueNoPop(target) => {
                    if self.peek(0, span)?.is_truthy() {
                        self.jump(target);
                    }
                }
                Op::JumpIfNotNull(target) => {
                    if !self.peek(0, span)?.is_null() {
                        self.jump(target);
                    }
                }
                Op::JumpIfNotError(target) => {
                    if !self.peek(0, span)?.is_error() {
                        self.jump(target);
                    }
                }

                // --- Loops ---
                Op::LoopEnter {
                    continue_at,
                    exit_at,
                } => {
                    let stack_depth = self.stack.len() - stack_base;
                    self.enter_loop(continue_at, exit_at, stack_depth, None);
                }
                Op::LoopExit => {
                    if let Some(frame) = self.frames.last_mut() {
                        frame.loops.pop();
                    }
                }
                Op::ForInit {
                    continue_at,
                    exit_at,
                } => {
                    let items = match self.pop(span)? {
                        Value::List(items) => items.borrow().clone(),
                        other => {
                            return Err(RuntimeError::InvalidForSource(
                                other.type_name().to_string(),
                                span,
                            ))
                        }
                    };
                    let stack_depth = self.stack.len() - stack_base;
                    self.enter_loop(
                        continue_at,
                        exit_at,
                        stack_depth,
                        Some(ForState { items, next: 0 }),
                    );
                }
                Op::ForNext { value, index, exit } => {
                    let next = self
                        .frames
                        .last_mut()
                        .and_then(|frame| frame.loops.last_mut())
                        .and_then(|ctx| ctx.iter.as_mut())
                        .and_then(|state| {
                            let item = state.items.get(state.next).cloned()?;
                            state.next += 1;
                            Some((item, state.next - 1))
                        });
                    match next {
                        Some((item, position)) => {
                            if let Some(slot) = value {
                                *self.slot_mut(stack_base, slot, span)? = item;
                            }
                            if let Some(slot) = index {
                                *self.slot_mut(stack_base, slot, span)? =
                                    Value::Number(position as f64);
                            }
                        }
                        None => self.jump(exit),
                    }
                }
                Op::Break(depth) => self.leave_loops(depth, false, span)?,
                Op::Continue(depth) => self.leave_loops(depth, true, span)?,

                // --- Functions ---
                Op::Closure { proto, defaults } => {
                    self.make_closure(proto, defaults, span)?;
                }
                Op::Call { argc, names } => {
                    let names = self.names_constant(names);
                    self.call_value(argc as usize, names, span)?;
                }
                Op::Invoke { name, argc, names } => {
                    let name = self.string_constant(name);
                    let names = self.names_constant(names);
                    self.invoke(&name, argc as usize, names, span)?;
                }
                Op::Return => {
                    let result = self.pop(span)?;
                    let Some(frame) = self.frames.pop() else {
                        return Err(RuntimeError::new("Return with no active frame", span));
                    };
                    self.stack.truncate(frame.stack_base);

                    if let Some(id) = frame.coroutine {
                        self.finish_coroutine(id);
                    }
                    if let (Some(class), Value::Object(obj)) = (&frame.stamp_class, &result) {
                        obj.borrow_mut().class = Some(class.clone());
                    }
                    trace!(function = frame.closure.proto.display_name(), "return");

                    if self.frames.len() <= stop_depth {
                        return Ok(result);
                    }
                    self.push(result);
                }
                Op::Yield => {
                    let value = self.pop(span)?;
                    self.suspend_coroutine(span)?;
                    if self.frames.len() <= stop_depth {
                        return Ok(value);
                    }
                    self.push(value);
                }

                // --- Collections & access ---
                Op::List(n) => {
                    let items = self.pop_n(n as usize, span)?;
                    self.push(Value::list(items));
                }
                Op::Object(n) => {
                    let values = self.pop_n(n as usize * 2, span)?;
                    let mut fields = field_map();
                    let mut iter = values.into_iter();
                    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                        fields.insert(key.to_string(), value);
                    }
                    self.push(Value::object(fields));
                }
                Op::GetProperty(idx) => {
                    let name = self.string_constant(idx);
                    let target = self.pop(span)?;
                    let value = self.get_property(&target, &name)?;
                    self.push(value);
                }
                Op::SetProperty(idx) => {
                    let name = self.string_constant(idx);
                    let value = self.pop(span)?;
                    let target = self.pop(span)?;
                    let result = self.set_property(&target, &name, value)?;
                    self.push(result);
                }
                Op::GetIndex => {
                    let index = self.pop(span)?;
                    let target = self.pop(span)?;
                    let value = self.get_index(&target, &index)?;
                    self.push(value);
                }
                Op::SetIndex => {
                    let value = self.pop(span)?;
                    let index = self.pop(span)?;
                    let target = self.pop(span)?;
                    let result = self.set_index(&target, &index, value)?;
                    self.push(result);
                }
                Op::Destructure { index, last } => {
                    let source = self.pop(span)?;
                    self.push(destructure(&source, index as usize, last));
                }
                Op::BuildString(n) => {
                    let parts = self.pop_n(n as usize, span)?;
                    let result: String = parts.iter().map(|v| v.to_string()).collect();
                    self.push(Value::String(result));
                }

                // --- Modules ---
                Op::Import => {
                    let path = self.pop(span)?;
                    let module = self.import_module(&path, span)?;
                    self.push(module);
                }
                Op::ImportName(idx) => {
                    let name = self.string_constant(idx);
                    let module = self.pop(span)?;
                    let value = match &module {
                        Value::Object(obj) => obj.borrow().fields.get(&name).cloned().unwrap_or_else(
                            || Value::error(format!("'{}' is not exported by the module", name)),
                        ),
                        Value::Error(_) => module.clone(),
                        other => Value::error(format!(
                            "Cannot import '{}' from {}",
                            name,
                            other.type_name()
                        )),
                    };
                    self.push(value);
                }
            }
        }
    }

    // --- Stack operations ---

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self, span: Span) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow(span))
    }

    #[inline]
    pub fn peek(&self, distance: usize, span: Span) -> Result<&Value, RuntimeError> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or(RuntimeError::StackUnderflow(span))
    }

    /// Pop the top `n` values, in push order.
    pub fn pop_n(&mut self, n: usize, span: Span) -> Result<Vec<Value>, RuntimeError> {
        let start = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(RuntimeError::StackUnderflow(span))?;
        Ok(self.stack.split_off(start))
    }

    fn slot(&self, base: usize, slot: u16, span: Span) -> Result<&Value, RuntimeError> {
        self.stack
            .get(base + slot as usize)
            .ok_or_else(|| RuntimeError::new(format!("Invalid local slot {}", slot), span))
    }

    fn slot_mut(&mut self, base: usize, slot: u16, span: Span) -> Result<&mut Value, RuntimeError> {
        self.stack
            .get_mut(base + slot as usize)
            .ok_or_else(|| RuntimeError::new(format!("Invalid local slot {}", slot), span))
    }

    // --- Helpers ---

    pub(crate) fn constant(&self, idx: u16) -> Option<&Constant> {
        self.frames
            .last()
            .and_then(|frame| frame.closure.proto.chunk.constants.get(idx as usize))
    }

    pub(crate) fn string_constant(&self, idx: u16) -> String {
        match self.constant(idx) {
            Some(Constant::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    fn names_constant(&self, idx: Option<u16>) -> Option<Rc<[String]>> {
        match idx.and_then(|idx| self.constant(idx)) {
            Some(Constant::Names(names)) => Some(names.clone()),
            _ => None,
        }
    }

    fn jump(&mut self, target: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = target as usize;
        }
    }

    /// Module table of the running frame, or the main one outside any frame.
    pub fn current_globals(&self) -> Rc<RefCell<SymbolTable>> {
        self.frames
            .last()
            .map(|frame| frame.closure.globals.clone())
            .unwrap_or_else(|| self.globals.clone())
    }

    /// Resolve a name against the running module, then the builtins.
    pub fn lookup_name(&self, name: &str) -> Option<Value> {
        self.current_globals()
            .borrow()
            .get(name)
            .or_else(|| self.builtins.get(name).cloned())
    }

    fn binary(&mut self, op: BinaryOp, span: Span) -> Result<(), RuntimeError> {
        let b = self.pop(span)?;
        let a = self.pop(span)?;
        self.push(binary_op(op, a, b));
        Ok(())
    }

    fn enter_loop(&mut self, continue_at: u32, exit_at: u32, stack_depth: usize, iter: Option<ForState>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.loops.push(LoopContext {
                continue_at: continue_at as usize,
                exit_at: exit_at as usize,
                stack_depth,
                iter,
            });
        }
    }

    /// Break out of, or continue, the `depth`-th enclosing loop.
    fn leave_loops(&mut self, depth: u8, is_continue: bool, span: Span) -> Result<(), RuntimeError> {
        let keyword = if is_continue { "continue" } else { "break" };
        let depth = depth as usize;
        let Some(frame) = self.frames.last_mut() else {
            return Err(RuntimeError::new("No active frame", span));
        };
        if depth == 0 || frame.loops.len() < depth {
            return Err(RuntimeError::LoopDepth {
                keyword,
                depth,
                span,
            });
        }

        let keep = frame.loops.len() - depth + 1;
        frame.loops.truncate(keep);
        let (target, height) = match frame.loops.last() {
            Some(ctx) if is_continue => (ctx.continue_at, ctx.stack_depth),
            Some(ctx) => (ctx.exit_at, ctx.stack_depth),
            None => return Err(RuntimeError::LoopDepth { keyword, depth, span }),
        };
        frame.ip = target;
        let height = frame.stack_base + height;
        self.stack.truncate(height);
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a binary operator. Operand type mismatches give error values.
pub fn binary_op(op: BinaryOp, a: Value, b: Value) -> Value {
    match op {
        BinaryOp::Equal => return Value::Bool(a == b),
        BinaryOp::NotEqual => return Value::Bool(a != b),
        _ => {}
    }

    match (op, &a, &b) {
        (BinaryOp::Add, Value::Number(x), Value::Number(y)) => Value::Number(x + y),
        (BinaryOp::Add, Value::String(_), _) | (BinaryOp::Add, _, Value::String(_)) => {
            Value::String(format!("{}{}", a, b))
        }
        (BinaryOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Value::list(items)
        }
        (BinaryOp::Subtract, Value::Number(x), Value::Number(y)) => Value::Number(x - y),
        (BinaryOp::Multiply, Value::Number(x), Value::Number(y)) => Value::Number(x * y),
        (BinaryOp::Divide, Value::Number(x), Value::Number(y)) => Value::Number(x / y),
        (BinaryOp::Modulo, Value::Number(x), Value::Number(y)) => Value::Number(x % y),
        (BinaryOp::Power, Value::Number(x), Value::Number(y)) => Value::Number(x.powf(*y)),
        (BinaryOp::Less, Value::Number(x), Value::Number(y)) => Value::Bool(x < y),
        (BinaryOp::LessEqual, Value::Number(x), Value::Number(y)) => Value::Bool(x <= y),
        (BinaryOp::Greater, Value::Number(x), Value::Number(y)) => Value::Bool(x > y),
        (BinaryOp::GreaterEqual, Value::Number(x), Value::Number(y)) => Value::Bool(x >= y),
        (BinaryOp::Less, Value::String(x), Value::String(y)) => Value::Bool(x < y),
        (BinaryOp::LessEqual, Value::String(x), Value::String(y)) => Value::Bool(x <= y),
        (BinaryOp::Greater, Value::String(x), Value::String(y)) => Value::Bool(x > y),
        (BinaryOp::GreaterEqual, Value::String(x), Value::String(y)) => Value::Bool(x >= y),
        _ => Value::error(format!(
            "Cannot apply '{}' to {} and {}",
            op,
            a.type_name(),
            b.type_name()
        )),
    }
}

/// Element `index` of a list pattern source; with `last`, the remainder of
/// a longer list. Anything but a list binds `null`.
pub fn destructure(source: &Value, index: usize, last: bool) -> Value {
    let Value::List(items) = source else {
        return Value::Null;
    };
    let items = items.borrow();
    if last && items.len() > index + 1 {
        return Value::list(items[index..].to_vec());
    }
    items.get(index).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::generator::Generator;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompiledModule {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        Generator::generate(&program, None).expect("compile error")
    }

    fn run(source: &str) -> Value {
        let mut vm = Vm::new();
        vm.capture_output();
        vm.execute(&compile(source)).expect("vm error")
    }

    fn run_with_output(source: &str) -> (Value, Vec<String>) {
        let mut vm = Vm::new();
        vm.capture_output();
        let value = vm.execute(&compile(source)).expect("vm error");
        (value, vm.output().to_vec())
    }

    fn run_err(source: &str) -> RuntimeError {
        let mut vm = Vm::new();
        vm.capture_output();
        vm.execute(&compile(source)).expect_err("expected a fatal error")
    }

    fn global(source: &str, name: &str) -> Value {
        let mut vm = Vm::new();
        vm.capture_output();
        vm.execute(&compile(source)).expect("vm error");
        let value = vm.globals.borrow().get(name).unwrap_or(Value::Null);
        value
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn list(items: &[f64]) -> Value {
        Value::list(items.iter().map(|n| Value::Number(*n)).collect())
    }

    #[test]
    fn test_vm_arithmetic() {
        assert_eq!(run("let x = 2 + 3"), num(5.0));
        assert_eq!(run("2 + 3 * 4 - 6 / 3"), num(12.0));
        assert_eq!(run("2 ** 3 ** 2"), num(512.0));
        assert_eq!(run("7 % 4"), num(3.0));
    }

    #[test]
    fn test_vm_is_deterministic() {
        let module = compile("let x = 2 + 3\nx * 2");
        let mut vm = Vm::new();
        let first = vm.execute(&module).unwrap();
        let mut other = Vm::new();
        assert_eq!(first, other.execute(&module).unwrap());
        assert_eq!(first, num(10.0));
    }

    #[test]
    fn test_vm_string_concat() {
        assert_eq!(run(r#""hello" + " " + "world""#), Value::string("hello world"));
        assert_eq!(run(r#""n = " + 2"#), Value::string("n = 2"));
        assert_eq!(run("let name = \"Lumo\"\n`hi ${name}, ${1 + 1}!`"), Value::string("hi Lumo, 2!"));
    }

    #[test]
    fn test_vm_comparison_and_logic() {
        assert_eq!(run("5 > 3"), Value::Bool(true));
        assert_eq!(run("\"a\" < \"b\""), Value::Bool(true));
        assert_eq!(run("true && false"), Value::Bool(false));
        assert_eq!(run("null || 4"), num(4.0));
        assert_eq!(run("[1, 2] == [1, 2]"), Value::Bool(true));
    }

    #[test]
    fn test_nullish_and_error_coalescing() {
        assert_eq!(run("null ?? 3"), num(3.0));
        assert_eq!(run("0 ?? 3"), num(0.0));
        assert_eq!(run("error(\"boom\") ?! 7"), num(7.0));
        assert_eq!(run("5 ?! 7"), num(5.0));
    }

    #[test]
    fn test_mismatched_operands_give_error_values() {
        assert!(run("1 - \"a\"").is_error());
        assert!(run("-null").is_error());
    }

    #[test]
    fn test_const_global_assignment_degrades() {
        let (value, _) = run_with_output("const x = 1\nx = 2");
        assert!(value.is_error());
        assert_eq!(global("const x = 1\nx = 2", "x"), num(1.0));
    }

    #[test]
    fn test_global_redeclaration_rules() {
        assert_eq!(global("let a = 1\nlet a = 2", "a"), num(2.0));
        assert_eq!(global("var b = 1\nvar b = 2", "b"), num(1.0));
        assert!(run("const c = 1\nlet c = 2").is_error());
    }

    #[test]
    fn test_undefined_variable_is_an_error_value() {
        let value = run("missing");
        assert_eq!(value.to_string(), "Error: Undefined variable 'missing'");
    }

    #[test]
    fn test_if_else_and_blocks() {
        assert_eq!(
            global("let x = 10\nlet y = 0\nif (x > 5) { y = 1 } else { y = 2 }", "y"),
            num(1.0)
        );
        assert_eq!(global("let y = 0\nif (true) { let y = 5 }", "y"), num(0.0));
    }

    #[test]
    fn test_while_loop() {
        let source = "let i = 0\nlet sum = 0\nwhile (i < 10) { sum += i; i += 1 }";
        assert_eq!(global(source, "sum"), num(45.0));
    }

    #[test]
    fn test_for_loop_binds_value_and_index() {
        let source = "let seen = []\nfor ([10, 20, 30], v, i) { append(seen, [v, i]) }\nseen";
        let expected = Value::list(vec![list(&[10.0, 0.0]), list(&[20.0, 1.0]), list(&[30.0, 2.0])]);
        assert_eq!(run(source), expected);
        assert!(run("for ([1], v) { }\nv").is_error());
    }

    #[test]
    fn test_for_over_non_list_is_fatal() {
        assert!(matches!(run_err("for (5, v) { }"), RuntimeError::InvalidForSource(..)));
    }

    #[test]
    fn test_c_style_loop() {
        let source = "let total = 0\nloop (let i = 1, i <= 4, i += 1) { total += i }\ntotal";
        assert_eq!(run(source), num(10.0));
    }

    #[test]
    fn test_break_two_levels() {
        let source = r#"
let hits = 0
for ([1, 2, 3], a) {
    for ([1, 2, 3], b) {
        hits += 1
        if (b == 2) { break(2) }
    }
}
hits
"#;
        assert_eq!(run(source), num(2.0));
    }

    #[test]
    fn test_continue_skips_rest_of_body() {
        let source = r#"
let odd = []
loop (let i = 0, i < 6, i += 1) {
    if (i % 2 == 0) { continue }
    append(odd, i)
}
odd
"#;
        assert_eq!(run(source), list(&[1.0, 3.0, 5.0]));

        let nested = r#"
let pairs = 0
for ([1, 2], a) {
    let j = 0
    while (j < 3) {
        j += 1
        if (j == 2) { continue(2) }
        pairs += 1
    }
}
pairs
"#;
        assert_eq!(run(nested), num(2.0));
    }

    #[test]
    fn test_break_inside_function_keeps_stack_balanced() {
        let source = r#"
let find = (items, target) => {
    let found = -1
    for (items, v, i) {
        let doubled = v * 2
        if (v == target) { found = i; break }
    }
    found
}
find([4, 5, 6], 5) + find([1], 9)
"#;
        assert_eq!(run(source), num(0.0));
    }

    #[test]
    fn test_list_destructuring_takes_remainder() {
        assert_eq!(global("let [a, b, c] = [1, 2, 3, 4, 5]", "c"), list(&[3.0, 4.0, 5.0]));
        assert_eq!(global("let [a, b] = 7", "a"), Value::Null);
        assert_eq!(run("let f = () => { let [x, y] = [1]; y }\nf()"), Value::Null);
    }

    #[test]
    fn test_object_destructuring() {
        let source = "let p = {name: \"Ada\", tags: [1, 2]}\nlet {name, tags: [first]} = p\n";
        assert_eq!(global(source, "name"), Value::string("Ada"));
        assert_eq!(global(source, "first"), list(&[1.0, 2.0]));
        let local = "let f = (p) => { let {x, y} = p; x + y }\nf({x: 1, y: 2})";
        assert_eq!(run(local), num(3.0));
    }

    #[test]
    fn test_property_and_index_access() {
        assert_eq!(run("let o = {a: {b: 1}}\no.a.b = 3\no.a.b"), num(3.0));
        assert_eq!(run("let l = [1, 2]\nl[0] = 5\nl[0] + l.length"), num(7.0));
        assert_eq!(run("\"hey\"[1]"), Value::string("e"));
        assert_eq!(run("[1][4]"), Value::Null);
        assert_eq!(run("let o = {a: 1}\no.b"), Value::Null);
        assert!(run("let l = [1]\nl[5] = 2").is_error());
        assert!(run("let n = 1\nn.x = 2").is_error());
    }

    #[test]
    fn test_compound_assignment_targets() {
        assert_eq!(run("let o = {n: 1}\no.n += 4\no.n"), num(5.0));
        assert_eq!(run("let l = [1, 2]\nl[1] *= 10\nl[1]"), num(20.0));
        assert_eq!(run("let f = () => { let n = 2; n *= 3; n }\nf()"), num(6.0));
    }

    #[test]
    fn test_print_joins_arguments() {
        let (_, output) = run_with_output("print(\"a\", 1, [1, \"b\"], {k: null})");
        assert_eq!(output, vec!["a 1 [1, \"b\"] {k: null}".to_string()]);
    }
}
