//! Type annotation AST nodes.

use std::fmt;

use crate::span::Span;

/// A type annotation in the source code, written after `::`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub kind: TypeKind,
    pub span: Span,
}

impl TypeAnnotation {
    pub fn new(kind: TypeKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The kinds of types that can be expressed in source.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// `number`, `string`, `boolean`, `any`, ...
    Named(String),
    /// List type: `[T]`
    List(Box<TypeAnnotation>),
    /// Object schema: `{ name :: string, age :: number }`
    Object(Vec<(String, TypeAnnotation)>),
    /// Nullable type: `T?`
    Nullable(Box<TypeAnnotation>),
}

impl fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Named(name) => write!(f, "{}", name),
            TypeKind::List(inner) => write!(f, "[{}]", inner),
            TypeKind::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} :: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            TypeKind::Nullable(inner) => write!(f, "{}?", inner),
        }
    }
}
