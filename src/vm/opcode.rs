//! Bytecode opcodes for the Lumo VM.

use crate::ast::{BinaryOp, DeclKind};

/// A single bytecode instruction. Jump operands are absolute instruction
/// indices within the owning chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // --- Constants & Literals ---
    /// Push a constant from the constant pool onto the stack.
    Constant(u16),
    /// Push null.
    Null,
    /// Push true.
    True,
    /// Push false.
    False,

    // --- Stack manipulation ---
    /// Pop the top value off the stack, logging it if it is an error value.
    Pop,
    /// Discard N block locals going out of scope.
    PopN(u16),
    /// Duplicate the top of the stack.
    Dup,
    /// Duplicate the top two values, keeping their order.
    Dup2,

    // --- Variables ---
    /// Push the value in a frame slot.
    GetLocal(u16),
    /// Store the top of the stack into a frame slot (value stays on the stack).
    SetLocal(u16),
    /// Fused `slot = slot <op> top`; pushes the result.
    UpdateLocal(u16, BinaryOp),
    /// Look up a module symbol, then the builtins, by name constant.
    GetGlobal(u16),
    /// Assign a module symbol by name constant, defining it if absent.
    /// Leaves the value, or an error value if the symbol is constant.
    SetGlobal(u16),
    /// Declare a module symbol. Leaves the value, or an error value when the
    /// redeclaration is not allowed.
    DefineGlobal(u16, DeclKind),

    // --- Arithmetic ---
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Negate,

    // --- Comparison & logic ---
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Not,

    // --- Control flow ---
    /// Unconditional jump.
    Jump(u32),
    /// Pop the condition and jump if it is falsy.
    JumpIfFalse(u32),
    /// Jump if the top is falsy, leaving it on the stack (for `&&`).
    JumpIfFalseNoPop(u32),
    /// Jump if the top is truthy, leaving it on the stack (for `||`).
    JumpIfTrueNoPop(u32),
    /// Jump if the top is not null, leaving it on the stack (for `??`).
    JumpIfNotNull(u32),
    /// Jump if the top is not an error value, leaving it on the stack (for `?!`).
    JumpIfNotError(u32),

    // --- Loops ---
    /// Push a loop context for `while`/`loop` onto the frame.
    LoopEnter { continue_at: u32, exit_at: u32 },
    /// Pop the innermost loop context.
    LoopExit,
    /// Pop a list and push a `for` loop context iterating over a snapshot of it.
    ForInit { continue_at: u32, exit_at: u32 },
    /// Bind the next element (and index) into slots, or jump to `exit` when done.
    ForNext {
        value: Option<u16>,
        index: Option<u16>,
        exit: u32,
    },
    /// Leave the n-th enclosing loop.
    Break(u8),
    /// Resume the n-th enclosing loop at its continue point.
    Continue(u8),

    // --- Functions ---
    /// Create a closure from a function constant, popping `defaults` default values.
    Closure { proto: u16, defaults: u8 },
    /// Call the value beneath `argc` arguments. `names` is a constant listing
    /// the names of the trailing named arguments.
    Call { argc: u8, names: Option<u16> },
    /// Call property `name` of the receiver beneath `argc` arguments.
    Invoke {
        name: u16,
        argc: u8,
        names: Option<u16>,
    },
    /// Return the top of the stack from the current frame.
    Return,
    /// Suspend the current coroutine, handing the top of the stack to the caller.
    Yield,

    // --- Collections & access ---
    /// Build a list from the top N values.
    List(u16),
    /// Build an object from the top N key/value pairs.
    Object(u16),
    /// Read a property by name constant.
    GetProperty(u16),
    /// Write a property: [object, value] -> value.
    SetProperty(u16),
    /// Read by computed index: [target, index] -> value.
    GetIndex,
    /// Write by computed index: [target, index, value] -> value.
    SetIndex,
    /// Take element `index` of a list pattern source; the last element takes
    /// the remainder of a longer list.
    Destructure { index: u16, last: bool },
    /// Concatenate the display form of the top N values.
    BuildString(u16),

    // --- Modules ---
    /// Pop a path and push the loaded module object.
    Import,
    /// Pop a module object and push one of its exports.
    ImportName(u16),
}
