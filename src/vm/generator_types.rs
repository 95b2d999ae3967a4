//! Best-effort static type checks run while generating code.
//!
//! Inference is shallow: literals, annotated or constant names, arithmetic
//! and calls to functions whose literal the generator has seen. Anything
//! else is `any` and passes every check.

use std::rc::Rc;

use crate::ast::{Argument, BinaryOp, Expr, ExprKind, FunctionLiteral, LogicalOp, UnaryOp};
use crate::error::CompileError;
use crate::types::TypeRepr;

use super::generator::{CompileResult, FunctionSig, Generator};

impl Generator {
    /// Infer the static type of an expression.
    pub fn infer_expr_type(&self, expr: &Expr) -> TypeRepr {
        match &expr.kind {
            ExprKind::Number(_) => TypeRepr::Number,
            ExprKind::StringLiteral(_) | ExprKind::Template(_) => TypeRepr::String,
            ExprKind::BoolLiteral(_) => TypeRepr::Boolean,
            ExprKind::Null => TypeRepr::Null,
            ExprKind::Variable(name) => self.declared_type(name).unwrap_or(TypeRepr::Any),
            ExprKind::Grouping(inner) => self.infer_expr_type(inner),
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                if operator.is_comparison() {
                    return TypeRepr::Boolean;
                }
                let left = self.infer_expr_type(left);
                let right = self.infer_expr_type(right);
                match (operator, &left, &right) {
                    (BinaryOp::Add, TypeRepr::String, _) | (BinaryOp::Add, _, TypeRepr::String) => {
                        TypeRepr::String
                    }
                    (_, TypeRepr::Number, TypeRepr::Number) => TypeRepr::Number,
                    _ => TypeRepr::Any,
                }
            }
            ExprKind::Unary { operator, .. } => match operator {
                UnaryOp::Not => TypeRepr::Boolean,
                UnaryOp::Negate => TypeRepr::Number,
            },
            ExprKind::Logical {
                operator: LogicalOp::And | LogicalOp::Or,
                left,
                right,
            } => {
                let left = self.infer_expr_type(left);
                if left == self.infer_expr_type(right) {
                    left
                } else {
                    TypeRepr::Any
                }
            }
            ExprKind::Ternary {
                then_branch,
                else_branch,
                ..
            } => {
                let then_ty = self.infer_expr_type(then_branch);
                if then_ty == self.infer_expr_type(else_branch) {
                    then_ty
                } else {
                    TypeRepr::Any
                }
            }
            ExprKind::List(items) => {
                let mut element = None;
                for item in items {
                    let ty = self.infer_expr_type(item);
                    match &element {
                        None => element = Some(ty),
                        Some(existing) if *existing == ty => {}
                        Some(_) => {
                            element = Some(TypeRepr::Any);
                            break;
                        }
                    }
                }
                TypeRepr::List(Box::new(element.unwrap_or(TypeRepr::Any)))
            }
            ExprKind::Object(fields) => TypeRepr::Object(Some(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), self.infer_expr_type(value)))
                    .collect(),
            )),
            ExprKind::Function(_) => TypeRepr::Function,
            ExprKind::Call { callee, .. } => self
                .callee_sig(callee)
                .and_then(|sig| sig.return_type.clone())
                .unwrap_or(TypeRepr::Any),
            ExprKind::Assign { value, .. } => self.infer_expr_type(value),
            _ => TypeRepr::Any,
        }
    }

    /// Declared (or constant-inferred) type of a name in scope.
    fn declared_type(&self, name: &str) -> Option<TypeRepr> {
        match self.resolve_local(name) {
            Some(slot) => self.locals[slot as usize].ty.clone(),
            None => self.script_globals().get(name).and_then(|info| info.ty.clone()),
        }
    }

    /// Signature of the function a callee expression names, if known.
    fn callee_sig(&self, callee: &Expr) -> Option<Rc<FunctionSig>> {
        let ExprKind::Variable(name) = &callee.kind else {
            return None;
        };
        match self.resolve_local(name) {
            Some(slot) => self.locals[slot as usize].sig.clone(),
            None => self.script_globals().get(name).and_then(|info| info.sig.clone()),
        }
    }

    pub fn function_sig(&self, func: &FunctionLiteral) -> CompileResult<Rc<FunctionSig>> {
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let ty = param
                .type_annotation
                .as_ref()
                .map(TypeRepr::from_annotation)
                .transpose()?;
            params.push((param.name.clone(), ty, param.is_rest));
        }
        let return_type = func
            .return_type
            .as_ref()
            .map(TypeRepr::from_annotation)
            .transpose()?;
        Ok(Rc::new(FunctionSig {
            params,
            return_type,
        }))
    }

    fn expect_type(&mut self, expected: &TypeRepr, expr: &Expr) {
        let found = self.infer_expr_type(expr);
        if !found.is_assignable_to(expected) {
            self.report(CompileError::type_mismatch(
                expected.to_string(),
                found.to_string(),
                expr.span,
            ));
        }
    }

    pub fn check_declaration(&mut self, expected: &TypeRepr, init: &Expr) {
        self.expect_type(expected, init);
    }

    pub fn check_assignment(&mut self, name: &str, value: &Expr) {
        if let Some(expected) = self.declared_type(name) {
            self.expect_type(&expected, value);
        }
    }

    pub fn check_return_type(&mut self, expr: &Expr) {
        if let Some(expected) = self.proto.return_type.clone() {
            self.expect_type(&expected, expr);
        }
    }

    /// Check arguments against the parameter types of a known callee.
    pub fn check_call_arguments(&mut self, callee: &Expr, arguments: &[Argument]) {
        let Some(sig) = self.callee_sig(callee) else {
            return;
        };

        let mut position = 0;
        for arg in arguments {
            match arg {
                Argument::Positional(expr) => {
                    let param = sig.params.get(position);
                    match param {
                        Some((_, Some(ty), false)) => self.expect_type(ty, expr),
                        // Everything from the catch-all on is collected into a list
                        Some((_, _, true)) => break,
                        _ => {}
                    }
                    position += 1;
                }
                Argument::Named(named) => {
                    let param = sig.params.iter().find(|(name, _, _)| *name == named.name);
                    if let Some((_, Some(ty), false)) = param {
                        self.expect_type(ty, &named.value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{CompileError, Diagnostics};
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::chunk::CompiledModule;
    use crate::vm::generator::Generator;

    fn compile(source: &str) -> Result<CompiledModule, Diagnostics> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        Generator::generate(&program, None)
    }

    fn mismatch(source: &str) -> (String, String) {
        match compile(source) {
            Err(Diagnostics(errors)) => match &errors[0] {
                CompileError::TypeMismatch {
                    expected, found, ..
                } => (expected.clone(), found.clone()),
                other => panic!("expected a type mismatch, got {}", other),
            },
            Ok(_) => panic!("expected a type mismatch for {}", source),
        }
    }

    #[test]
    fn test_declaration_annotation() {
        assert_eq!(
            mismatch("let n :: number = \"one\""),
            ("number".to_string(), "string".to_string())
        );
        assert!(compile("let n :: number = 1 + 2").is_ok());
        assert!(compile("let s :: string = \"a\" + 1").is_ok());
    }

    #[test]
    fn test_unknown_types_pass() {
        assert!(compile("let n :: number = someCall()").is_ok());
        assert!(compile("let x = \"a\"\nlet n :: number = x").is_ok());
    }

    #[test]
    fn test_constants_carry_inferred_types() {
        assert!(compile("const x = \"a\"\nlet n :: number = x").is_err());
    }

    #[test]
    fn test_assignment_to_annotated_name() {
        assert!(compile("let n :: number = 1\nn = \"two\"").is_err());
        assert!(compile("let n :: number = 1\nn = 2").is_ok());
    }

    #[test]
    fn test_call_arguments() {
        let source = "let greet = (name :: string, times :: number = 1) => name\n";
        assert!(compile(&format!("{}greet(1)", source)).is_err());
        assert!(compile(&format!("{}greet(\"a\", times: \"b\")", source)).is_err());
        assert!(compile(&format!("{}greet(\"a\", times: 2)", source)).is_ok());
    }

    #[test]
    fn test_rest_parameter_is_not_checked_positionally() {
        assert!(compile("let f = (a :: number, ...rest) => a\nf(1, \"x\", true)").is_ok());
    }

    #[test]
    fn test_return_type() {
        assert!(compile("let f = () :: number => \"x\"").is_err());
        assert!(compile("let f = () :: number => { return 1 }").is_ok());
    }

    #[test]
    fn test_object_schema() {
        assert!(compile("let p :: {x :: number} = {x: 1, y: 2}").is_ok());
        assert!(compile("let p :: {x :: number} = {x: \"a\"}").is_err());
    }

    #[test]
    fn test_unknown_type_name_is_an_error() {
        assert!(compile("let p :: widget = 1").is_err());
    }

    #[test]
    fn test_checks_can_be_disabled() {
        let tokens = Scanner::new("let n :: number = \"one\"").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        assert!(Generator::generate_with(&program, None, false).is_ok());
    }
}
