//! Coroutine records: suspended activations kept in an arena on the VM.

use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::error::RuntimeError;
use crate::runtime::value::{Closure, CoroutineHandle, Value};
use crate::span::Span;

use super::vm::{CallFrame, LoopContext, Vm};

/// Live record count at which the arena first looks for dropped handles.
const FIRST_SWEEP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    Suspended,
    Running,
}

/// A coroutine activation between resumptions.
#[derive(Debug)]
pub struct CoroutineRecord {
    pub closure: Rc<Closure>,
    pub ip: usize,
    /// Frame slots from the callee slot up, as of the last suspension.
    pub saved_stack: Vec<Value>,
    pub saved_loops: Vec<LoopContext>,
    pub state: CoroutineState,
}

#[derive(Debug)]
struct CoroutineSlot {
    generation: u32,
    /// Dead once every handle to the record has been dropped.
    owner: Weak<()>,
    record: Option<CoroutineRecord>,
}

/// Slot storage for coroutine records. A slot is freed when its coroutine
/// finishes, or when a sweep finds a suspended record with no handles left.
#[derive(Debug)]
pub struct CoroutineArena {
    slots: Vec<CoroutineSlot>,
    free: Vec<usize>,
    sweep_at: usize,
}

impl CoroutineArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            sweep_at: FIRST_SWEEP,
        }
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, record: CoroutineRecord) -> (usize, u32, Rc<()>) {
        if self.free.is_empty() && self.len() >= self.sweep_at {
            self.sweep();
            self.sweep_at = (self.len() * 2).max(FIRST_SWEEP);
        }

        let token = Rc::new(());
        let owner = Rc::downgrade(&token);
        match self.free.pop() {
            Some(id) => {
                let slot = &mut self.slots[id];
                slot.owner = owner;
                slot.record = Some(record);
                (id, slot.generation, token)
            }
            None => {
                self.slots.push(CoroutineSlot {
                    generation: 0,
                    owner,
                    record: Some(record),
                });
                (self.slots.len() - 1, 0, token)
            }
        }
    }

    /// The record a handle refers to, unless its slot has been released.
    fn get_mut(&mut self, handle: &CoroutineHandle) -> Option<&mut CoroutineRecord> {
        self.slots
            .get_mut(handle.id)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    fn get(&self, handle: &CoroutineHandle) -> Option<&CoroutineRecord> {
        self.slots
            .get(handle.id)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    /// Records of running frames are never released, so the bare id is enough.
    fn running_mut(&mut self, id: usize) -> Option<&mut CoroutineRecord> {
        self.slots.get_mut(id).and_then(|slot| slot.record.as_mut())
    }

    fn release(&mut self, id: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            if slot.record.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                slot.owner = Weak::new();
                self.free.push(id);
            }
        }
    }

    /// Release suspended records that no handle refers to any more.
    fn sweep(&mut self) {
        let orphaned: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.owner.strong_count() == 0
                    && matches!(&slot.record, Some(record) if record.state == CoroutineState::Suspended)
            })
            .map(|(id, _)| id)
            .collect();
        debug!(released = orphaned.len(), "coroutine sweep");
        for id in orphaned {
            self.release(id);
        }
    }

    /// Release records left running by an aborted run.
    pub(crate) fn release_running(&mut self) {
        let running: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(&slot.record, Some(record) if record.state == CoroutineState::Running))
            .map(|(id, _)| id)
            .collect();
        for id in running {
            self.release(id);
        }
    }
}

impl Default for CoroutineArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a suspended record for a call to a coroutine function with its
    /// bound parameters and return its handle.
    pub fn create_coroutine(&mut self, closure: Rc<Closure>, params: Vec<Value>) -> Value {
        let mut saved_stack = Vec::with_capacity(1 + params.len() + closure.captures.len());
        saved_stack.push(Value::Function(closure.clone()));
        saved_stack.extend(params);
        saved_stack.extend(closure.captures.iter().cloned());

        let name: Rc<str> = Rc::from(closure.proto.display_name());
        let (id, generation, token) = self.coroutines.insert(CoroutineRecord {
            closure,
            ip: 0,
            saved_stack,
            saved_loops: Vec::new(),
            state: CoroutineState::Suspended,
        });
        trace!(id, generation, name = %name, "coroutine created");
        Value::Coroutine(CoroutineHandle {
            id,
            generation,
            name,
            token,
        })
    }

    /// Resume a coroutine: restore its slots and push its frame. An
    /// exhausted coroutine evaluates to `null`.
    pub fn resume_coroutine(&mut self, handle: &CoroutineHandle, span: Span) -> Result<(), RuntimeError> {
        let Some(record) = self.coroutines.get_mut(handle) else {
            self.push(Value::Null);
            return Ok(());
        };

        match record.state {
            CoroutineState::Running => {
                let message = format!(
                    "Coroutine '{}' is already running",
                    record.closure.proto.display_name()
                );
                warn!(line = span.line, id = handle.id, "coroutine resumed while running");
                self.push(Value::error(message));
                Ok(())
            }
            CoroutineState::Suspended => {
                record.state = CoroutineState::Running;
                let closure = record.closure.clone();
                let ip = record.ip;
                let saved = std::mem::take(&mut record.saved_stack);
                let loops = std::mem::take(&mut record.saved_loops);

                let stack_base = self.stack.len();
                self.stack.extend(saved);
                self.frames.push(CallFrame {
                    closure,
                    ip,
                    stack_base,
                    loops,
                    coroutine: Some(handle.id),
                    stamp_class: None,
                });
                Ok(())
            }
        }
    }

    /// Save the running coroutine frame back into its record and pop it.
    pub(crate) fn suspend_coroutine(&mut self, span: Span) -> Result<(), RuntimeError> {
        let Some(frame) = self.frames.pop() else {
            return Err(RuntimeError::new("Yield with no active frame", span));
        };
        let Some(id) = frame.coroutine else {
            return Err(RuntimeError::new(
                format!("Yield outside a coroutine in '{}'", frame.closure.proto.display_name()),
                span,
            ));
        };

        let saved_stack = self.stack.split_off(frame.stack_base);
        if let Some(record) = self.coroutines.running_mut(id) {
            record.ip = frame.ip;
            record.saved_stack = saved_stack;
            record.saved_loops = frame.loops;
            record.state = CoroutineState::Suspended;
        }
        Ok(())
    }

    /// Mark a coroutine as exhausted and free its arena slot.
    pub(crate) fn finish_coroutine(&mut self, id: usize) {
        self.coroutines.release(id);
        trace!(id, "coroutine done");
    }

    pub fn coroutine_done(&self, handle: &CoroutineHandle) -> bool {
        self.coroutines.get(handle).is_none()
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::value::Value;
    use crate::vm::Vm;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> Value {
        let module = crate::compile(source, None).expect("compile error");
        let mut vm = Vm::new();
        vm.capture_output();
        vm.execute(&module).expect("vm error")
    }

    fn nums(items: &[f64]) -> Value {
        Value::list(items.iter().map(|n| Value::Number(*n)).collect())
    }

    #[test]
    fn test_coroutine_yields_then_stays_exhausted() {
        let source = r#"
let counter = () => {
    yield 1
    yield 2
    yield 3
}
let co = counter()
let seen = [co(), co(), co()]
let after = isDone(co)
append(seen, co(), co(), isDone(co))
[seen, after]
"#;
        let result = run(source);
        let expected = Value::list(vec![
            Value::list(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0),
                Value::Null,
                Value::Null,
                Value::Bool(true),
            ]),
            Value::Bool(false),
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn test_coroutine_keeps_locals_and_loops_across_yields() {
        let source = r#"
let range = (limit) => {
    let i = 0
    while (i < limit) {
        yield i
        i += 1
    }
    return "end"
}
let co = range(3)
[co(), co(), co(), co(), co()]
"#;
        let result = run(source);
        let expected = Value::list(vec![
            Value::Number(0.0),
            Value::Number(1.0),
            Value::Number(2.0),
            Value::string("end"),
            Value::Null,
        ]);
        assert_eq!(result, expected);
    }

    #[test]
    fn test_each_call_creates_an_independent_coroutine() {
        let source = r#"
let gen = (start) => {
    yield start
    yield start + 1
}
let a = gen(10)
let b = gen(20)
[a(), b(), a(), b()]
"#;
        assert_eq!(run(source), nums(&[10.0, 20.0, 11.0, 21.0]));
    }

    #[test]
    fn test_coroutine_over_for_loop() {
        let source = r#"
let each = (items) => {
    for (items, v) { yield v * 10 }
}
let co = each([1, 2])
[co(), co(), co()]
"#;
        let expected = Value::list(vec![Value::Number(10.0), Value::Number(20.0), Value::Null]);
        assert_eq!(run(source), expected);
    }

    #[test]
    fn test_resuming_a_running_coroutine_is_an_error_value() {
        let source = r#"
let slot = {}
let selfish = () => {
    yield slot.co()
}
slot.co = selfish()
slot.co()
"#;
        assert!(run(source).is_error());
    }

    #[test]
    fn test_finished_coroutines_free_their_slots() {
        let source = r#"
let g = () => { yield 1 }
loop (let i = 0, i < 10000, i += 1) {
    let c = g()
    c()
    c()
}
"#;
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        vm.execute(&module).unwrap();
        assert_eq!(vm.coroutines.len(), 0);
    }

    #[test]
    fn test_abandoned_coroutines_are_swept() {
        let source = r#"
let g = () => {
    yield 1
    yield 2
}
loop (let i = 0, i < 10000, i += 1) {
    let c = g()
    c()
}
let kept = g()
kept()
[kept(), isDone(kept)]
"#;
        let module = crate::compile(source, None).unwrap();
        let mut vm = Vm::new();
        let result = vm.execute(&module).unwrap();
        assert_eq!(result.to_string(), "[2, false]");
        assert!(vm.coroutines.len() <= 128, "arena holds {} records", vm.coroutines.len());
    }

    #[test]
    fn test_stale_handle_does_not_reach_a_reused_slot() {
        let source = r#"
let once = () => { yield "first" }
let a = once()
a()
a()
let b = once()
[a(), isDone(a), b(), isDone(b)]
"#;
        assert_eq!(run(source).to_string(), "[null, true, \"first\", false]");
    }
}
