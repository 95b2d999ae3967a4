//! Module system for Lumo.
//!
//! This module provides:
//! - Import path resolution relative to the importing file
//! - A cache of loaded module exports
//! - Circular import detection

mod resolver;

pub use resolver::{canonicalize, ModuleResolver, ResolveError, EXTENSION};
