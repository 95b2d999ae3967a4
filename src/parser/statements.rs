//! Statement parsing: if, while, for, loop, break/continue, return, yield, blocks.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Loop => self.loop_statement(),
            TokenKind::Break => self.jump_statement(true),
            TokenKind::Continue => self.jump_statement(false),
            TokenKind::Return => self.return_statement(),
            TokenKind::Yield => self.yield_statement(),
            TokenKind::LeftBrace => self.block_statement(),
            _ => self.expression_statement(),
        }
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::If)?;

        let condition = self.parenthesized_condition()?;
        let then_branch = Box::new(self.branch_body()?);

        let else_branch = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Box::new(self.if_statement()?))
            } else {
                Some(Box::new(self.branch_body()?))
            }
        } else {
            None
        };

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::While)?;

        let condition = self.parenthesized_condition()?;
        let body = Box::new(self.branch_body()?);
        let span = start_span.merge(&self.previous_span());

        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    /// for (seq[, value[, index]]) body
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LeftParen)?;

        let iterable = self.expression()?;
        let value = if self.match_token(&TokenKind::Comma) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let index = if value.is_some() && self.match_token(&TokenKind::Comma) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.expect(&TokenKind::RightParen)?;

        let body = Box::new(self.branch_body()?);
        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::For {
                iterable,
                value,
                index,
                body,
            },
            span,
        ))
    }

    /// loop (init, cond, step) body, or a bare `loop body`
    fn loop_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Loop)?;

        let (mut init, mut condition, mut step) = (None, None, None);
        if self.match_token(&TokenKind::LeftParen) {
            if !self.check(&TokenKind::Comma) {
                init = Some(Box::new(
                    if self.check(&TokenKind::Let)
                        || self.check(&TokenKind::Const)
                        || self.check(&TokenKind::Var)
                    {
                        self.variable_declaration()?
                    } else {
                        self.expression_statement()?
                    },
                ));
            }
            self.expect(&TokenKind::Comma)?;
            if !self.check(&TokenKind::Comma) {
                condition = Some(self.expression()?);
            }
            self.expect(&TokenKind::Comma)?;
            if !self.check(&TokenKind::RightParen) {
                step = Some(self.expression()?);
            }
            self.expect(&TokenKind::RightParen)?;
        }

        let body = Box::new(self.branch_body()?);
        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::Loop {
                init,
                condition,
                step,
                body,
            },
            span,
        ))
    }

    /// break / continue with an optional `(depth)`.
    fn jump_statement(&mut self, is_break: bool) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.advance();

        let mut depth = 1;
        if !self.at_line_break() && self.match_token(&TokenKind::LeftParen) {
            let depth_span = self.current_span();
            match self.advance().kind {
                TokenKind::Number(n) if n >= 1.0 && n.fract() == 0.0 => depth = n as usize,
                _ => {
                    return Err(ParserError::general(
                        "Loop depth must be a positive integer literal",
                        depth_span,
                    ))
                }
            }
            self.expect(&TokenKind::RightParen)?;
        }

        let span = start_span.merge(&self.previous_span());
        let kind = if is_break {
            StmtKind::Break(depth)
        } else {
            StmtKind::Continue(depth)
        };
        Ok(Stmt::new(kind, span))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Return)?;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.expression()?)
        };
        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn yield_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::Yield)?;
        let value = if self.at_statement_end() {
            None
        } else {
            Some(self.expression()?)
        };
        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Yield(value), span))
    }

    fn block_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;
        let statements = self.block_contents()?;
        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Block(statements), span))
    }

    /// Parse statements after an opening `{` up to and including the `}`.
    pub(crate) fn block_contents(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(ParserError::unexpected_eof(self.current_span()));
            }
            if self.match_token(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.declaration()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(statements)
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        let span = expr.span;
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    fn parenthesized_condition(&mut self) -> ParseResult<Expr> {
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        Ok(condition)
    }

    /// The body of an `if`/loop: a block or a single statement.
    fn branch_body(&mut self) -> ParseResult<Stmt> {
        if self.check(&TokenKind::LeftBrace) {
            self.block_statement()
        } else {
            let stmt = self.declaration()?;
            let span = stmt.span;
            Ok(Stmt::new(StmtKind::Block(vec![stmt]), span))
        }
    }
}
