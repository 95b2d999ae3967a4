//! Module-level symbol tables.

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::DeclKind;
use crate::runtime::value::{field_map, FieldMap, Value};

/// A module-level binding.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub value: Value,
    pub is_const: bool,
    /// Declared with `let`: a later `let` reassigns instead of failing.
    pub can_reassign: bool,
    /// Declared at the top level of its module (as opposed to seeded or
    /// created by a bare assignment).
    pub is_global: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SymbolError {
    #[error("Cannot assign to constant '{0}'")]
    ConstAssignment(String),

    #[error("'{0}' is already declared")]
    Redeclaration(String),
}

/// Bindings of one module: a script, an imported file or an isolated eval.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: IndexMap<String, Symbol, ahash::RandomState>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded from the fields of an object, as used by isolated `eval`.
    pub fn from_fields(fields: &FieldMap) -> Self {
        let mut table = Self::new();
        for (name, value) in fields {
            table.symbols.insert(
                name.clone(),
                Symbol {
                    value: value.clone(),
                    is_const: false,
                    can_reassign: true,
                    is_global: false,
                },
            );
        }
        table
    }

    /// Declare a binding. `let` over `let` reassigns; every other
    /// redeclaration fails and leaves the old value.
    pub fn declare(&mut self, name: &str, value: Value, kind: DeclKind) -> Result<(), SymbolError> {
        if let Some(existing) = self.symbols.get_mut(name) {
            if existing.can_reassign && kind.can_redeclare() {
                existing.value = value;
                return Ok(());
            }
            if existing.is_global {
                return Err(SymbolError::Redeclaration(name.to_string()));
            }
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                value,
                is_const: kind.is_const(),
                can_reassign: kind.can_redeclare(),
                is_global: true,
            },
        );
        Ok(())
    }

    /// Assign an existing binding, or define a new reassignable one.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), SymbolError> {
        match self.symbols.get_mut(name) {
            Some(symbol) if symbol.is_const => Err(SymbolError::ConstAssignment(name.to_string())),
            Some(symbol) => {
                symbol.value = value;
                Ok(())
            }
            None => {
                self.symbols.insert(
                    name.to_string(),
                    Symbol {
                        value,
                        is_const: false,
                        can_reassign: true,
                        is_global: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Bind `name` over whatever the table holds for it, returning the
    /// hidden binding for `unbind_temporary`.
    pub fn bind_temporary(&mut self, name: &str, value: Value, is_const: bool) -> Option<Symbol> {
        self.symbols.insert(
            name.to_string(),
            Symbol {
                value,
                is_const,
                can_reassign: !is_const,
                is_global: false,
            },
        )
    }

    /// Put back the binding `bind_temporary` hid and return the value the
    /// temporary one ended with.
    pub fn unbind_temporary(&mut self, name: &str, hidden: Option<Symbol>) -> Option<Value> {
        let current = match hidden {
            Some(symbol) => self.symbols.insert(name.to_string(), symbol),
            None => self.symbols.shift_remove(name),
        };
        current.map(|symbol| symbol.value)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.symbols.get(name).map(|s| s.value.clone())
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Binding names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }

    /// Every binding, as the fields of a module object.
    pub fn exports(&self) -> FieldMap {
        let mut fields = field_map();
        for (name, symbol) in &self.symbols {
            fields.insert(name.clone(), symbol.value.clone());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_temporary_binding_restores_what_it_hid() {
        let mut table = SymbolTable::new();
        table.declare("a", Value::Number(1.0), DeclKind::Let).unwrap();
        let hidden = table.bind_temporary("a", Value::Number(10.0), false);
        let fresh = table.bind_temporary("b", Value::Number(20.0), true);
        table.assign("a", Value::Number(11.0)).unwrap();
        assert!(table.assign("b", Value::Number(0.0)).is_err());

        assert_eq!(table.unbind_temporary("b", fresh), Some(Value::Number(20.0)));
        assert_eq!(table.unbind_temporary("a", hidden), Some(Value::Number(11.0)));
        assert_eq!(table.get("a"), Some(Value::Number(1.0)));
        assert!(!table.contains("b"));
    }

    #[test]
    fn test_let_over_let_reassigns() {
        let mut table = SymbolTable::new();
        table.declare("x", Value::Number(1.0), DeclKind::Let).unwrap();
        table.declare("x", Value::Number(2.0), DeclKind::Let).unwrap();
        assert_eq!(table.get("x"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_other_redeclarations_fail() {
        let mut table = SymbolTable::new();
        table.declare("c", Value::Number(1.0), DeclKind::Const).unwrap();
        assert_eq!(
            table.declare("c", Value::Number(2.0), DeclKind::Let),
            Err(SymbolError::Redeclaration("c".to_string()))
        );
        table.declare("v", Value::Number(1.0), DeclKind::Var).unwrap();
        assert!(table.declare("v", Value::Number(2.0), DeclKind::Var).is_err());
        assert!(table.declare("v", Value::Number(2.0), DeclKind::Let).is_err());
        assert_eq!(table.get("c"), Some(Value::Number(1.0)));
        assert_eq!(table.get("v"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_const_assignment_fails() {
        let mut table = SymbolTable::new();
        table.declare("x", Value::Number(1.0), DeclKind::Const).unwrap();
        assert!(table.assign("x", Value::Number(2.0)).is_err());
        assert_eq!(table.get("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_assign_defines_missing_name() {
        let mut table = SymbolTable::new();
        table.assign("fresh", Value::Bool(true)).unwrap();
        assert_eq!(table.names(), vec!["fresh".to_string()]);
        // A dynamic binding can later be declared over
        table.declare("fresh", Value::Null, DeclKind::Const).unwrap();
        assert!(table.symbol("fresh").unwrap().is_const);
    }
}
