//! Type representation for annotations and runtime schema checks.

pub mod type_repr;

pub use type_repr::TypeRepr;
