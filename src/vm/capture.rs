//! Free-identifier analysis for function literals.
//!
//! A function captures, by value, every identifier its body (including
//! nested literals) reads or writes that its own parameters do not bind.

use indexmap::IndexSet;

use crate::ast::{
    Argument, Declaration, Expr, ExprKind, FunctionLiteral, Stmt, StmtKind, TemplateSegment,
};

/// Identifiers referenced by `func` that its parameters do not bind, in
/// order of first use.
pub fn free_identifiers(func: &FunctionLiteral) -> Vec<String> {
    let mut names = IndexSet::new();
    for stmt in &func.body {
        collect_stmt(stmt, &mut names);
    }
    names
        .into_iter()
        .filter(|name: &String| {
            !func.params.iter().any(|p| &p.name == name) && func.name.as_ref() != Some(name)
        })
        .collect()
}

fn collect_stmt(stmt: &Stmt, names: &mut IndexSet<String>) {
    match &stmt.kind {
        StmtKind::Expression(expr) => collect_expr(expr, names),
        StmtKind::Declaration(Declaration { initializer, .. }) => {
            if let Some(init) = initializer {
                collect_expr(init, names);
            }
        }
        StmtKind::Block(stmts) => {
            for s in stmts {
                collect_stmt(s, names);
            }
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_expr(condition, names);
            collect_stmt(then_branch, names);
            if let Some(e) = else_branch {
                collect_stmt(e, names);
            }
        }
        StmtKind::While { condition, body } => {
            collect_expr(condition, names);
            collect_stmt(body, names);
        }
        StmtKind::For { iterable, body, .. } => {
            collect_expr(iterable, names);
            collect_stmt(body, names);
        }
        StmtKind::Loop {
            init,
            condition,
            step,
            body,
        } => {
            if let Some(init) = init {
                collect_stmt(init, names);
            }
            if let Some(c) = condition {
                collect_expr(c, names);
            }
            if let Some(s) = step {
                collect_expr(s, names);
            }
            collect_stmt(body, names);
        }
        StmtKind::Return(Some(expr)) | StmtKind::Yield(Some(expr)) => collect_expr(expr, names),
        StmtKind::Import(import) => collect_expr(&import.path, names),
        StmtKind::Return(None) | StmtKind::Yield(None) | StmtKind::Break(_) | StmtKind::Continue(_) => {}
    }
}

fn collect_expr(expr: &Expr, names: &mut IndexSet<String>) {
    match &expr.kind {
        ExprKind::Variable(name) => {
            names.insert(name.clone());
        }
        ExprKind::Number(_) | ExprKind::StringLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::Null => {}
        ExprKind::Template(segments) => {
            for segment in segments {
                if let TemplateSegment::Expr(e) = segment {
                    collect_expr(e, names);
                }
            }
        }
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            collect_expr(left, names);
            collect_expr(right, names);
        }
        ExprKind::Unary { operand, .. } => collect_expr(operand, names),
        ExprKind::Grouping(inner) => collect_expr(inner, names),
        ExprKind::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_expr(condition, names);
            collect_expr(then_branch, names);
            collect_expr(else_branch, names);
        }
        ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
            collect_expr(target, names);
            collect_expr(value, names);
        }
        ExprKind::Call { callee, arguments } => {
            collect_expr(callee, names);
            for arg in arguments {
                match arg {
                    Argument::Positional(e) => collect_expr(e, names),
                    Argument::Named(n) => collect_expr(&n.value, names),
                }
            }
        }
        ExprKind::Member { object, .. } => collect_expr(object, names),
        ExprKind::Index { object, index } => {
            collect_expr(object, names);
            collect_expr(index, names);
        }
        ExprKind::List(items) => {
            for item in items {
                collect_expr(item, names);
            }
        }
        ExprKind::Object(fields) => {
            for (_, value) in fields {
                collect_expr(value, names);
            }
        }
        ExprKind::Function(func) => {
            for param in &func.params {
                if let Some(default) = &param.default_value {
                    collect_expr(default, names);
                }
            }
            for name in free_identifiers(func) {
                names.insert(name);
            }
        }
    }
}

/// Whether a function body suspends, ignoring nested function literals.
pub fn contains_yield(body: &[Stmt]) -> bool {
    body.iter().any(stmt_yields)
}

fn stmt_yields(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Yield(_) => true,
        StmtKind::Block(stmts) => stmts.iter().any(stmt_yields),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => stmt_yields(then_branch) || else_branch.as_deref().is_some_and(stmt_yields),
        StmtKind::While { body, .. } | StmtKind::For { body, .. } => stmt_yields(body),
        StmtKind::Loop { init, body, .. } => {
            init.as_deref().is_some_and(stmt_yields) || stmt_yields(body)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn function(source: &str) -> FunctionLiteral {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        match &program.statements[0].kind {
            StmtKind::Declaration(Declaration {
                initializer: Some(Expr {
                    kind: ExprKind::Function(func),
                    ..
                }),
                ..
            }) => (**func).clone(),
            other => panic!("Expected function declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_free_identifiers_skip_params_and_self() {
        let func = function("let f = (a, b) => { let c = a + y; f(c, z) }");
        assert_eq!(free_identifiers(&func), vec!["y", "c", "z"]);
    }

    #[test]
    fn test_nested_literals_contribute() {
        let func = function("let f = (a) => (b = d) => a + b + e");
        assert_eq!(free_identifiers(&func), vec!["d", "e"]);
    }

    #[test]
    fn test_contains_yield_ignores_nested_functions() {
        let gen = function("let g = (n) => { while (true) { yield n } }");
        assert!(contains_yield(&gen.body));
        let plain = function("let p = () => { let inner = () => { yield 1 }; inner }");
        assert!(!contains_yield(&plain.body));
    }
}
