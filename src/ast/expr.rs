//! Expression AST nodes.

use std::fmt;

use crate::ast::stmt::Stmt;
use crate::ast::types::TypeAnnotation;
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// A named argument in a function call: `name: value`
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// An argument in a function call (positional or named)
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Positional(Expr),
    Named(NamedArgument),
}

/// Function parameter: `name`, `name = default`, `name :: type` or `...rest`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_annotation: Option<TypeAnnotation>,
    pub default_value: Option<Expr>,
    pub is_rest: bool,
    pub span: Span,
}

/// A function literal: `(a, b = 1, ...rest) :: type => body`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    /// Display name, filled in when the literal initialises a declaration.
    pub name: Option<String>,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Vec<Stmt>,
}

/// Part of a template string.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    Text(String),
    Expr(Expr),
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Number literal: 42, 2.5
    Number(f64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Template string: `hello ${name}`
    Template(Vec<TemplateSegment>),
    /// Boolean literal: true, false
    BoolLiteral(bool),
    /// Null literal
    Null,

    /// Variable reference: foo
    Variable(String),

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation: -x, !x
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Short-circuit operators: a && b, a || b, a ?? b, a ?! b
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
    },

    /// Grouping expression: (expr)
    Grouping(Box<Expr>),

    /// Conditional expression: cond ? a : b
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// Assignment expression: x = 5, obj.a = 1, list[0] = 2
    Assign { target: Box<Expr>, value: Box<Expr> },

    /// Compound assignment: x += 1
    CompoundAssign {
        target: Box<Expr>,
        operator: BinaryOp,
        value: Box<Expr>,
    },

    /// Function call: foo(a, b) or foo(named: value)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Argument>,
    },

    /// Member access: obj.field
    Member { object: Box<Expr>, name: String },

    /// Index access: list[index], obj["key"]
    Index { object: Box<Expr>, index: Box<Expr> },

    /// List literal: [1, 2, 3]
    List(Vec<Expr>),

    /// Object literal: { key: value }
    Object(Vec<(String, Expr)>),

    /// Function literal
    Function(Box<FunctionLiteral>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::Power => write!(f, "**"),
            BinaryOp::Equal => write!(f, "=="),
            BinaryOp::NotEqual => write!(f, "!="),
            BinaryOp::Less => write!(f, "<"),
            BinaryOp::LessEqual => write!(f, "<="),
            BinaryOp::Greater => write!(f, ">"),
            BinaryOp::GreaterEqual => write!(f, ">="),
        }
    }
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    /// `??`: right side when the left is null
    Nullish,
    /// `?!`: right side when the left is an error value
    ErrorCoalesce,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}
