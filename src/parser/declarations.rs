//! Declaration parsing: variables, destructuring patterns, parameters, imports.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn declaration(&mut self) -> ParseResult<Stmt> {
        let stmt = if self.check(&TokenKind::Import) {
            self.import_declaration()?
        } else if self.check(&TokenKind::Let)
            || self.check(&TokenKind::Const)
            || self.check(&TokenKind::Var)
        {
            self.variable_declaration()?
        } else {
            self.statement()?
        };
        self.match_token(&TokenKind::Semicolon);
        Ok(stmt)
    }

    /// Parse `let|const|var pattern [:: type] [= expr]`.
    pub(crate) fn variable_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        let kind = match self.advance().kind {
            TokenKind::Const => DeclKind::Const,
            TokenKind::Var => DeclKind::Var,
            _ => DeclKind::Let,
        };

        let pattern = self.parse_pattern()?;

        let type_annotation = if self.match_token(&TokenKind::DoubleColon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let mut initializer = if self.match_token(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        if initializer.is_none() && !matches!(pattern, Pattern::Identifier(_)) {
            return Err(ParserError::general(
                "Destructuring declaration requires an initializer",
                self.current_span(),
            ));
        }
        if initializer.is_none() && kind.is_const() {
            return Err(ParserError::general(
                "Constant declaration requires an initializer",
                self.current_span(),
            ));
        }

        if let (Pattern::Identifier(name), Some(initializer)) = (&pattern, initializer.as_mut()) {
            name_function_literal(initializer, name);
        }

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::Declaration(Declaration {
                kind,
                pattern,
                type_annotation,
                initializer,
            }),
            span,
        ))
    }

    /// Parse a binding target: a name, `[a, b]` or `{a, b: [c]}`.
    pub(crate) fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let start_span = self.current_span();
        if self.match_token(&TokenKind::LeftBracket) {
            let mut items = Vec::new();
            while !self.check(&TokenKind::RightBracket) {
                items.push(self.parse_pattern()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightBracket)?;
            if items.is_empty() {
                return Err(ParserError::general("Empty destructuring pattern", start_span));
            }
            return Ok(Pattern::List(items));
        }

        if self.match_token(&TokenKind::LeftBrace) {
            let mut fields = Vec::new();
            while !self.check(&TokenKind::RightBrace) {
                let key = self.expect_identifier()?;
                let target = if self.match_token(&TokenKind::Colon) {
                    self.parse_pattern()?
                } else {
                    Pattern::Identifier(key.clone())
                };
                fields.push((key, target));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightBrace)?;
            if fields.is_empty() {
                return Err(ParserError::general("Empty destructuring pattern", start_span));
            }
            return Ok(Pattern::Object(fields));
        }

        match &self.peek().kind {
            TokenKind::Identifier(_) => Ok(Pattern::Identifier(self.expect_identifier()?)),
            _ => Err(ParserError::unexpected_token(
                "identifier or destructuring pattern",
                format!("{}", self.peek().kind),
                self.current_span(),
            )),
        }
    }

    /// Parse a parameter list after its opening `(`, consuming the `)`.
    pub(crate) fn parse_parameters(&mut self) -> ParseResult<Vec<Parameter>> {
        let mut params: Vec<Parameter> = Vec::new();

        while !self.check(&TokenKind::RightParen) {
            let start = self.current_span();
            if params.last().is_some_and(|p| p.is_rest) {
                return Err(ParserError::general(
                    "Catch-all parameter must be the last parameter",
                    start,
                ));
            }

            let is_rest = self.match_token(&TokenKind::Spread);
            let name = match &self.peek().kind {
                TokenKind::Identifier(_) => self.expect_identifier()?,
                _ => {
                    return Err(ParserError::general(
                        format!("Expected parameter name, found '{}'", self.peek().kind),
                        self.current_span(),
                    ))
                }
            };
            if params.iter().any(|p| p.name == name) {
                return Err(ParserError::general(
                    format!("Duplicate parameter '{}'", name),
                    start,
                ));
            }

            let type_annotation = if self.match_token(&TokenKind::DoubleColon) {
                Some(self.parse_type()?)
            } else {
                None
            };

            let default_value = if self.match_token(&TokenKind::Equal) {
                if is_rest {
                    return Err(ParserError::general(
                        "Catch-all parameter cannot have a default value",
                        start,
                    ));
                }
                Some(self.expression()?)
            } else {
                None
            };

            params.push(Parameter {
                name,
                type_annotation,
                default_value,
                is_rest,
                span: start.merge(&self.previous_span()),
            });

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RightParen)?;
        Ok(params)
    }

    /// Parse an import declaration.
    /// Syntax:
    ///   import utils from "./utils.lm"        -- whole module
    ///   import { add, sub } from "./utils.lm" -- named bindings
    pub(crate) fn import_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Import)?;

        let binding = if self.match_token(&TokenKind::LeftBrace) {
            let mut names = Vec::new();
            while !self.check(&TokenKind::RightBrace) {
                let span = self.current_span();
                names.push((self.expect_identifier()?, span));
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RightBrace)?;
            if names.is_empty() {
                return Err(ParserError::general("Empty import list", start_span));
            }
            ImportBinding::Names(names)
        } else {
            ImportBinding::Module(self.expect_identifier()?)
        };

        self.expect(&TokenKind::From)?;
        let path = self.expression()?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Import(ImportDecl { path, binding }), span))
    }
}

/// `let add = (a, b) => ...` and `Point = class((x) => ...)` name an
/// anonymous function literal after the binding it is stored in.
pub(crate) fn name_function_literal(expr: &mut Expr, name: &str) {
    match &mut expr.kind {
        ExprKind::Function(func) if func.name.is_none() => func.name = Some(name.to_string()),
        ExprKind::Call { callee, arguments } if matches!(&callee.kind, ExprKind::Variable(c) if c == "class") => {
            if let [Argument::Positional(inner)] = arguments.as_mut_slice() {
                name_function_literal(inner, name);
            }
        }
        ExprKind::Grouping(inner) => name_function_literal(inner, name),
        _ => {}
    }
}
