//! Bytecode chunk and function prototype types.

use std::path::PathBuf;
use std::rc::Rc;

use crate::types::TypeRepr;

use super::opcode::Op;

/// A constant value stored in a chunk's constant pool.
#[derive(Debug, Clone)]
pub enum Constant {
    Number(f64),
    String(String),
    /// A compiled function prototype.
    Function(Rc<FunctionProto>),
    /// Names of the named arguments at a call site.
    Names(Rc<[String]>),
}

/// Where a closure copies a captured value from when it is created.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSource {
    /// A slot of the enclosing frame.
    Local(u16),
    /// A symbol of the defining module.
    Global(String),
}

/// A declared parameter.
#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub has_default: bool,
    pub is_rest: bool,
    pub ty: Option<TypeRepr>,
}

/// A compiled function (or top-level script).
///
/// Frame slot layout: slot 0 holds the callee, then one slot per parameter,
/// then one per capture, then block locals.
#[derive(Debug, Clone)]
pub struct FunctionProto {
    /// Function name (empty string for top-level script).
    pub name: String,
    pub params: Vec<ParamInfo>,
    /// Captured names, in slot order.
    pub captures: Vec<(String, CaptureSource)>,
    pub return_type: Option<TypeRepr>,
    /// Contains `yield`; calling it creates a coroutine handle.
    pub is_coroutine: bool,
    /// The bytecode instructions.
    pub chunk: Chunk,
    /// File this function was compiled from, if any.
    pub source_path: Option<Rc<PathBuf>>,
    /// Named slots with the instruction range each is in scope for.
    pub slot_names: Vec<SlotName>,
}

/// A named local slot, live for instructions `start..end`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotName {
    pub name: String,
    pub slot: u16,
    pub is_const: bool,
    pub start: usize,
    pub end: usize,
}

impl FunctionProto {
    pub fn new(name: impl Into<String>, source_path: Option<Rc<PathBuf>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            captures: Vec::new(),
            return_type: None,
            is_coroutine: false,
            chunk: Chunk::new(),
            source_path,
            slot_names: Vec::new(),
        }
    }

    /// Named slots in scope at instruction `offset`. An inner binding hides
    /// an outer one of the same name.
    pub fn slots_at(&self, offset: usize) -> Vec<&SlotName> {
        let mut visible: Vec<&SlotName> = Vec::new();
        for entry in self.slot_names.iter().filter(|s| s.start <= offset && offset < s.end) {
            match visible.iter_mut().find(|v| v.name == entry.name) {
                Some(shadowed) if shadowed.slot < entry.slot => *shadowed = entry,
                Some(_) => {}
                None => visible.push(entry),
            }
        }
        visible
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Index of the catch-all parameter, if there is one.
    pub fn rest_index(&self) -> Option<usize> {
        self.params.iter().position(|p| p.is_rest)
    }
}

/// A chunk of bytecode: instructions + constant pool + line info.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// The bytecode instructions.
    pub code: Vec<Op>,
    /// Source line numbers, parallel to `code`.
    pub lines: Vec<usize>,
    /// Constant pool.
    pub constants: Vec<Constant>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction and record its source line.
    pub fn emit(&mut self, op: Op, line: usize) -> usize {
        let offset = self.code.len();
        self.code.push(op);
        self.lines.push(line);
        offset
    }

    /// Add a constant to the pool and return its index. String constants
    /// are deduplicated.
    pub fn add_constant(&mut self, constant: Constant) -> usize {
        if let Constant::String(ref s) = constant {
            let existing = self
                .constants
                .iter()
                .position(|c| matches!(c, Constant::String(e) if e == s));
            if let Some(i) = existing {
                return i;
            }
        }
        self.constants.push(constant);
        self.constants.len() - 1
    }

    /// Get the current offset (next instruction index).
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Point the jump at `offset` to the next instruction to be emitted.
    pub fn patch_jump(&mut self, offset: usize) {
        let here = self.code.len() as u32;
        match &mut self.code[offset] {
            Op::Jump(target)
            | Op::JumpIfFalse(target)
            | Op::JumpIfFalseNoPop(target)
            | Op::JumpIfTrueNoPop(target)
            | Op::JumpIfNotNull(target)
            | Op::JumpIfNotError(target)
            | Op::ForNext { exit: target, .. } => {
                *target = here;
            }
            other => debug_assert!(false, "patching non-jump instruction {:?}", other),
        }
    }

    /// Fill in the continue and exit points of a loop entry instruction.
    pub fn patch_loop(&mut self, offset: usize, continue_to: usize, exit_to: usize) {
        match &mut self.code[offset] {
            Op::LoopEnter {
                continue_at,
                exit_at,
            }
            | Op::ForInit {
                continue_at,
                exit_at,
            } => {
                *continue_at = continue_to as u32;
                *exit_at = exit_to as u32;
            }
            other => debug_assert!(false, "patching non-loop instruction {:?}", other),
        }
    }
}

/// A compiled module: the top-level script function.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    pub main: Rc<FunctionProto>,
}
