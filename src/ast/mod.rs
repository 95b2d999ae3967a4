//! Abstract Syntax Tree for Lumo.

pub mod expr;
pub mod stmt;
pub mod types;

pub use expr::{
    Argument, BinaryOp, Expr, ExprKind, FunctionLiteral, LogicalOp, NamedArgument, Parameter,
    TemplateSegment, UnaryOp,
};
pub use stmt::{DeclKind, Declaration, ImportBinding, ImportDecl, Pattern, Program, Stmt, StmtKind};
pub use types::{TypeAnnotation, TypeKind};
