//! Internal type representation shared by the generator's inline checks and
//! the VM's parameter schema checks.

use std::fmt;

use crate::ast::{TypeAnnotation, TypeKind};
use crate::error::CompileError;
use crate::runtime::value::Value;

/// Internal representation of types.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRepr {
    Number,
    String,
    Boolean,
    Null,
    List(Box<TypeRepr>),
    /// An object; `None` when its shape is not known.
    Object(Option<Vec<(String, TypeRepr)>>),
    Function,
    Error,
    Coroutine,
    Nullable(Box<TypeRepr>),
    /// Escape hatch; also what inference falls back to.
    Any,
}

impl TypeRepr {
    /// Resolve a source annotation.
    pub fn from_annotation(annotation: &TypeAnnotation) -> Result<TypeRepr, CompileError> {
        Ok(match &annotation.kind {
            TypeKind::Named(name) => match name.as_str() {
                "number" => TypeRepr::Number,
                "string" => TypeRepr::String,
                "boolean" | "bool" => TypeRepr::Boolean,
                "null" => TypeRepr::Null,
                "any" => TypeRepr::Any,
                "function" => TypeRepr::Function,
                "object" => TypeRepr::Object(None),
                "list" => TypeRepr::List(Box::new(TypeRepr::Any)),
                "error" => TypeRepr::Error,
                "coroutine" => TypeRepr::Coroutine,
                other => {
                    return Err(CompileError::new(
                        format!("Unknown type '{}'", other),
                        annotation.span,
                    ))
                }
            },
            TypeKind::List(inner) => TypeRepr::List(Box::new(Self::from_annotation(inner)?)),
            TypeKind::Object(fields) => {
                let mut resolved = Vec::with_capacity(fields.len());
                for (name, ty) in fields {
                    resolved.push((name.clone(), Self::from_annotation(ty)?));
                }
                TypeRepr::Object(Some(resolved))
            }
            TypeKind::Nullable(inner) => {
                TypeRepr::Nullable(Box::new(Self::from_annotation(inner)?))
            }
        })
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TypeRepr::Any)
    }

    /// Check if a value of type `self` may be stored where `target` is expected.
    pub fn is_assignable_to(&self, target: &TypeRepr) -> bool {
        if self == target {
            return true;
        }

        match (self, target) {
            (TypeRepr::Any, _) | (_, TypeRepr::Any) => true,
            (TypeRepr::Null, TypeRepr::Nullable(_)) => true,
            (TypeRepr::Nullable(a), TypeRepr::Nullable(b)) => a.is_assignable_to(b),
            (_, TypeRepr::Nullable(inner)) => self.is_assignable_to(inner),
            (TypeRepr::List(a), TypeRepr::List(b)) => a.is_assignable_to(b),
            (TypeRepr::Object(_), TypeRepr::Object(None)) => true,
            // Shape unknown at compile time: the runtime check decides
            (TypeRepr::Object(None), TypeRepr::Object(Some(_))) => true,
            (TypeRepr::Object(Some(have)), TypeRepr::Object(Some(want))) => {
                want.iter().all(|(name, want_ty)| {
                    have.iter()
                        .find(|(n, _)| n == name)
                        .is_some_and(|(_, have_ty)| have_ty.is_assignable_to(want_ty))
                })
            }
            _ => false,
        }
    }

    /// Structural check of a runtime value against this type.
    pub fn conforms(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeRepr::Any, _) => true,
            (TypeRepr::Nullable(_), Value::Null) => true,
            (TypeRepr::Nullable(inner), v) => inner.conforms(v),
            (TypeRepr::Number, Value::Number(_)) => true,
            (TypeRepr::String, Value::String(_)) => true,
            (TypeRepr::Boolean, Value::Bool(_)) => true,
            (TypeRepr::Null, Value::Null) => true,
            (TypeRepr::Error, Value::Error(_)) => true,
            (TypeRepr::Coroutine, Value::Coroutine(_)) => true,
            (TypeRepr::Function, Value::Function(_) | Value::Native(_)) => true,
            (TypeRepr::List(inner), Value::List(items)) => {
                items.borrow().iter().all(|item| inner.conforms(item))
            }
            (TypeRepr::Object(None), Value::Object(_)) => true,
            (TypeRepr::Object(Some(fields)), Value::Object(obj)) => {
                let obj = obj.borrow();
                fields.iter().all(|(name, ty)| {
                    obj.fields
                        .get(name)
                        .map(|v| ty.conforms(v))
                        .unwrap_or_else(|| ty.conforms(&Value::Null))
                })
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRepr::Number => write!(f, "number"),
            TypeRepr::String => write!(f, "string"),
            TypeRepr::Boolean => write!(f, "boolean"),
            TypeRepr::Null => write!(f, "null"),
            TypeRepr::List(inner) => write!(f, "[{}]", inner),
            TypeRepr::Object(None) => write!(f, "object"),
            TypeRepr::Object(Some(fields)) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} :: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            TypeRepr::Function => write!(f, "function"),
            TypeRepr::Error => write!(f, "error"),
            TypeRepr::Coroutine => write!(f, "coroutine"),
            TypeRepr::Nullable(inner) => write!(f, "{}?", inner),
            TypeRepr::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignability() {
        assert!(TypeRepr::Number.is_assignable_to(&TypeRepr::Any));
        assert!(TypeRepr::Null.is_assignable_to(&TypeRepr::Nullable(Box::new(TypeRepr::String))));
        assert!(!TypeRepr::String.is_assignable_to(&TypeRepr::Number));
        assert!(TypeRepr::List(Box::new(TypeRepr::Number))
            .is_assignable_to(&TypeRepr::List(Box::new(TypeRepr::Any))));

        let point = TypeRepr::Object(Some(vec![("x".into(), TypeRepr::Number)]));
        let bigger = TypeRepr::Object(Some(vec![
            ("x".into(), TypeRepr::Number),
            ("y".into(), TypeRepr::Number),
        ]));
        assert!(bigger.is_assignable_to(&point));
        assert!(!point.is_assignable_to(&bigger));
    }

    #[test]
    fn test_conforms() {
        let list = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert!(TypeRepr::List(Box::new(TypeRepr::Number)).conforms(&list));
        assert!(!TypeRepr::List(Box::new(TypeRepr::String)).conforms(&list));
        assert!(TypeRepr::Nullable(Box::new(TypeRepr::Number)).conforms(&Value::Null));
        assert!(!TypeRepr::Number.conforms(&Value::String("1".into())));
    }
}
