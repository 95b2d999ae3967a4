//! Runtime support for the VM: values, module symbol tables, builtins and
//! host interop.

pub mod builtins;
pub mod interop;
pub mod symbols;
pub mod value;

pub use interop::{HostError, HostLibrary, HostValue};
pub use symbols::SymbolTable;
pub use value::Value;
