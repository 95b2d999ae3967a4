//! Statement AST nodes.

use std::fmt;

use crate::ast::expr::Expr;
use crate::ast::types::TypeAnnotation;
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression statement
    Expression(Expr),

    /// `let`/`const`/`var` declaration
    Declaration(Declaration),

    /// Block: { statements }
    Block(Vec<Stmt>),

    /// If statement: if (cond) { ... } else { ... }
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// While loop: while (cond) { ... }
    While { condition: Expr, body: Box<Stmt> },

    /// For loop: for (seq, value, index) { ... }
    For {
        iterable: Expr,
        value: Option<String>,
        index: Option<String>,
        body: Box<Stmt>,
    },

    /// C-style loop: loop (init, cond, step) { ... }
    Loop {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },

    /// break / break(n)
    Break(usize),

    /// continue / continue(n)
    Continue(usize),

    /// Return statement: return expr
    Return(Option<Expr>),

    /// Suspend a coroutine: yield expr
    Yield(Option<Expr>),

    /// Import declaration
    Import(ImportDecl),
}

/// Declaration keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// Reassignable; redeclaring with `let` reassigns.
    Let,
    /// Neither reassignable nor redeclarable.
    Const,
    /// Reassignable but not redeclarable.
    Var,
}

impl DeclKind {
    pub fn is_const(&self) -> bool {
        matches!(self, DeclKind::Const)
    }

    pub fn can_redeclare(&self) -> bool {
        matches!(self, DeclKind::Let)
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclKind::Let => write!(f, "let"),
            DeclKind::Const => write!(f, "const"),
            DeclKind::Var => write!(f, "var"),
        }
    }
}

/// A binding target.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Identifier(String),
    /// `[a, b, c]`; the last name takes the remainder of a longer list
    List(Vec<Pattern>),
    /// `{a, b: [c, d]}`
    Object(Vec<(String, Pattern)>),
}

impl Pattern {
    /// Every name this pattern binds, in order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Identifier(name) => vec![name.as_str()],
            Pattern::List(items) => items.iter().flat_map(|p| p.names()).collect(),
            Pattern::Object(fields) => fields.iter().flat_map(|(_, p)| p.names()).collect(),
        }
    }
}

/// Variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub pattern: Pattern,
    pub type_annotation: Option<TypeAnnotation>,
    pub initializer: Option<Expr>,
}

/// What an import binds in the importing scope.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportBinding {
    /// `import utils from "./utils.lm"`
    Module(String),
    /// `import { add, sub } from "./utils.lm"`
    Names(Vec<(String, Span)>),
}

/// Import declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: Expr,
    pub binding: ImportBinding,
}

/// A parsed compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}
