//! Bytecode back end for Lumo: the generator lowers the syntax tree into
//! instruction chunks, and the stack VM executes them.

pub mod capture;
pub mod chunk;
pub mod disassembler;
pub mod generator;
pub mod generator_exprs;
pub mod generator_patterns;
pub mod generator_stmts;
pub mod generator_types;
pub mod opcode;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_access;
pub mod vm_calls;
pub mod vm_coroutines;
pub mod vm_modules;

pub use chunk::{CompiledModule, FunctionProto};
pub use disassembler::disassemble;
pub use generator::Generator;
pub use opcode::Op;
pub use vm::Vm;
