//! Expression parsing using Pratt precedence.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::{Scanner, TemplatePart, TokenKind};
use crate::span::Span;

use super::core::{ParseResult, Parser};
use super::declarations::name_function_literal;
use super::precedence::{get_precedence, Precedence};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.parse_precedence(Precedence::Assignment)
    }

    pub(crate) fn parse_precedence(&mut self, min_precedence: Precedence) -> ParseResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.is_at_end() {
            let precedence = get_precedence(&self.peek().kind);
            if precedence < min_precedence || precedence == Precedence::None {
                break;
            }
            // `f\n(x)` and `a\n[1]` start a new statement
            if self.at_line_break()
                && (self.check(&TokenKind::LeftParen) || self.check(&TokenKind::LeftBracket))
            {
                break;
            }

            left = self.parse_infix(left, precedence)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> ParseResult<Expr> {
        if self.is_at_end() {
            return Err(ParserError::unexpected_eof(self.current_span()));
        }
        let token = self.advance();
        let start_span = token.span;

        match &token.kind {
            TokenKind::Number(n) => Ok(Expr::new(ExprKind::Number(*n), start_span)),
            TokenKind::StringLiteral(s) => {
                Ok(Expr::new(ExprKind::StringLiteral(s.clone()), start_span))
            }
            TokenKind::TemplateString(parts) => self.parse_template(parts.clone(), start_span),
            TokenKind::BoolLiteral(b) => Ok(Expr::new(ExprKind::BoolLiteral(*b), start_span)),
            TokenKind::Null => Ok(Expr::new(ExprKind::Null, start_span)),

            TokenKind::Identifier(name) => {
                if self.check(&TokenKind::FatArrow) {
                    // x => body
                    let param = Parameter {
                        name: name.clone(),
                        type_annotation: None,
                        default_value: None,
                        is_rest: false,
                        span: start_span,
                    };
                    return self.parse_function_rest(vec![param], start_span);
                }
                Ok(Expr::new(ExprKind::Variable(name.clone()), start_span))
            }

            TokenKind::LeftParen => {
                if self.looks_like_function() {
                    let params = self.parse_parameters()?;
                    return self.parse_function_rest(params, start_span);
                }
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                let span = start_span.merge(&self.previous_span());
                Ok(Expr::new(ExprKind::Grouping(Box::new(expr)), span))
            }

            TokenKind::LeftBracket => self.parse_list(start_span),
            TokenKind::LeftBrace => self.parse_object(start_span),

            TokenKind::Minus => self.unary_expr(UnaryOp::Negate, start_span),
            TokenKind::Bang => self.unary_expr(UnaryOp::Not, start_span),

            _ => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", token.kind),
                token.span,
            )),
        }
    }

    fn unary_expr(&mut self, operator: UnaryOp, start_span: Span) -> ParseResult<Expr> {
        let operand = self.parse_precedence(Precedence::Unary)?;
        let span = start_span.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// After an opening `(`, decide whether this is a parameter list: the
    /// matching `)` must be followed by `=>` or a `::` return type.
    fn looks_like_function(&self) -> bool {
        let mut depth = 1usize;
        let mut offset = 0;
        loop {
            let token = self.peek_nth(offset);
            match token.kind {
                TokenKind::Eof => return false,
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        let next = &self.peek_nth(offset + 1).kind;
                        return matches!(next, TokenKind::FatArrow | TokenKind::DoubleColon);
                    }
                }
                _ => {}
            }
            offset += 1;
        }
    }

    /// Parse the `:: type => body` tail of a function literal.
    fn parse_function_rest(&mut self, params: Vec<Parameter>, start_span: Span) -> ParseResult<Expr> {
        let return_type = if self.match_token(&TokenKind::DoubleColon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::FatArrow)?;

        let body = if self.check(&TokenKind::LeftBrace) {
            self.advance();
            self.block_contents()?
        } else {
            let expr = self.expression()?;
            let span = expr.span;
            vec![Stmt::new(StmtKind::Expression(expr), span)]
        };

        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(
            ExprKind::Function(Box::new(FunctionLiteral {
                name: None,
                params,
                return_type,
                body,
            })),
            span,
        ))
    }

    fn parse_list(&mut self, start_span: Span) -> ParseResult<Expr> {
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RightBracket) {
            elements.push(self.expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBracket)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::List(elements), span))
    }

    fn parse_object(&mut self, start_span: Span) -> ParseResult<Expr> {
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            let key_span = self.current_span();
            let key = match self.advance().kind {
                TokenKind::Identifier(name) => name,
                TokenKind::StringLiteral(s) => s,
                TokenKind::Number(n) => crate::runtime::value::format_number(n),
                other => {
                    return Err(ParserError::unexpected_token(
                        "object key",
                        format!("{}", other),
                        key_span,
                    ))
                }
            };
            let value = if self.match_token(&TokenKind::Colon) {
                self.expression()?
            } else {
                // { name } shorthand
                Expr::new(ExprKind::Variable(key.clone()), key_span)
            };
            fields.push((key, value));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        let span = start_span.merge(&self.previous_span());
        Ok(Expr::new(ExprKind::Object(fields), span))
    }

    fn parse_template(&mut self, parts: Vec<TemplatePart>, span: Span) -> ParseResult<Expr> {
        let mut segments = Vec::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => segments.push(TemplateSegment::Text(text)),
                TemplatePart::Code(code, code_span) => {
                    let tokens = Scanner::at(&code, code_span.line, code_span.column)
                        .scan_tokens()?;
                    let expr = Parser::new(tokens).parse_standalone_expression()?;
                    segments.push(TemplateSegment::Expr(expr));
                }
            }
        }
        Ok(Expr::new(ExprKind::Template(segments), span))
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> ParseResult<Expr> {
        let token = self.advance();
        let start_span = left.span;

        match &token.kind {
            TokenKind::Plus => self.binary_expr(left, BinaryOp::Add, precedence),
            TokenKind::Minus => self.binary_expr(left, BinaryOp::Subtract, precedence),
            TokenKind::Star => self.binary_expr(left, BinaryOp::Multiply, precedence),
            TokenKind::Slash => self.binary_expr(left, BinaryOp::Divide, precedence),
            TokenKind::Percent => self.binary_expr(left, BinaryOp::Modulo, precedence),
            TokenKind::EqualEqual => self.binary_expr(left, BinaryOp::Equal, precedence),
            TokenKind::BangEqual => self.binary_expr(left, BinaryOp::NotEqual, precedence),
            TokenKind::Less => self.binary_expr(left, BinaryOp::Less, precedence),
            TokenKind::LessEqual => self.binary_expr(left, BinaryOp::LessEqual, precedence),
            TokenKind::Greater => self.binary_expr(left, BinaryOp::Greater, precedence),
            TokenKind::GreaterEqual => self.binary_expr(left, BinaryOp::GreaterEqual, precedence),
            TokenKind::StarStar => {
                // right-associative
                let right = self.parse_precedence(Precedence::Power)?;
                let span = start_span.merge(&right.span);
                Ok(Expr::new(
                    ExprKind::Binary {
                        left: Box::new(left),
                        operator: BinaryOp::Power,
                        right: Box::new(right),
                    },
                    span,
                ))
            }

            TokenKind::And => self.logical_expr(left, LogicalOp::And, precedence),
            TokenKind::Or => self.logical_expr(left, LogicalOp::Or, precedence),
            TokenKind::NullishCoalescing => self.logical_expr(left, LogicalOp::Nullish, precedence),
            TokenKind::ErrorCoalescing => {
                self.logical_expr(left, LogicalOp::ErrorCoalesce, precedence)
            }

            TokenKind::Question => {
                let then_expr = self.expression()?;
                if !self.match_token(&TokenKind::Colon) {
                    return Err(ParserError::general(
                        "Ternary expression is missing its ':' branch",
                        self.current_span(),
                    ));
                }
                let else_expr = self.parse_precedence(Precedence::Ternary)?;
                let span = start_span.merge(&else_expr.span);
                Ok(Expr::new(
                    ExprKind::Ternary {
                        condition: Box::new(left),
                        then_branch: Box::new(then_expr),
                        else_branch: Box::new(else_expr),
                    },
                    span,
                ))
            }

            TokenKind::Equal => {
                Self::check_assignment_target(&left)?;
                let mut value = self.parse_precedence(Precedence::Assignment)?;
                if let ExprKind::Variable(name) = &left.kind {
                    name_function_literal(&mut value, name);
                }
                let span = start_span.merge(&value.span);
                Ok(Expr::new(
                    ExprKind::Assign {
                        target: Box::new(left),
                        value: Box::new(value),
                    },
                    span,
                ))
            }
            TokenKind::PlusEqual => self.compound_assign(left, BinaryOp::Add),
            TokenKind::MinusEqual => self.compound_assign(left, BinaryOp::Subtract),
            TokenKind::StarEqual => self.compound_assign(left, BinaryOp::Multiply),
            TokenKind::SlashEqual => self.compound_assign(left, BinaryOp::Divide),
            TokenKind::PercentEqual => self.compound_assign(left, BinaryOp::Modulo),

            TokenKind::LeftParen => {
                let arguments = self.parse_arguments()?;
                self.expect(&TokenKind::RightParen)?;
                let span = start_span.merge(&self.previous_span());
                Ok(Expr::new(
                    ExprKind::Call {
                        callee: Box::new(left),
                        arguments,
                    },
                    span,
                ))
            }

            TokenKind::Dot => {
                let name = self.expect_identifier()?;
                let span = start_span.merge(&self.previous_span());
                Ok(Expr::new(
                    ExprKind::Member {
                        object: Box::new(left),
                        name,
                    },
                    span,
                ))
            }

            TokenKind::LeftBracket => {
                if self.check(&TokenKind::RightBracket) {
                    return Err(ParserError::general("Empty index accessor", self.current_span()));
                }
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = start_span.merge(&self.previous_span());
                Ok(Expr::new(
                    ExprKind::Index {
                        object: Box::new(left),
                        index: Box::new(index),
                    },
                    span,
                ))
            }

            _ => Err(ParserError::unexpected_token(
                "operator",
                format!("{}", token.kind),
                token.span,
            )),
        }
    }

    fn binary_expr(
        &mut self,
        left: Expr,
        operator: BinaryOp,
        precedence: Precedence,
    ) -> ParseResult<Expr> {
        let right = self.parse_precedence(precedence.next())?;
        let span = left.span.merge(&right.span);
        Ok(Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn logical_expr(
        &mut self,
        left: Expr,
        operator: LogicalOp,
        precedence: Precedence,
    ) -> ParseResult<Expr> {
        let right = self.parse_precedence(precedence.next())?;
        let span = left.span.merge(&right.span);
        Ok(Expr::new(
            ExprKind::Logical {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            span,
        ))
    }

    fn compound_assign(&mut self, target: Expr, operator: BinaryOp) -> ParseResult<Expr> {
        Self::check_assignment_target(&target)?;
        let value = self.parse_precedence(Precedence::Assignment)?;
        let span = target.span.merge(&value.span);
        Ok(Expr::new(
            ExprKind::CompoundAssign {
                target: Box::new(target),
                operator,
                value: Box::new(value),
            },
            span,
        ))
    }

    fn check_assignment_target(target: &Expr) -> ParseResult<()> {
        match target.kind {
            ExprKind::Variable(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => Ok(()),
            _ => Err(ParserError::invalid_assignment_target(target.span)),
        }
    }

    /// Parse call arguments up to (not including) the closing `)`.
    pub(crate) fn parse_arguments(&mut self) -> ParseResult<Vec<Argument>> {
        let mut arguments = Vec::new();
        let mut seen_named = false;

        while !self.check(&TokenKind::RightParen) {
            let is_named = matches!(self.peek().kind, TokenKind::Identifier(_))
                && self.peek_nth(1).kind == TokenKind::Colon;

            if is_named {
                let start = self.current_span();
                let name = self.expect_identifier()?;
                self.expect(&TokenKind::Colon)?;
                let value = self.expression()?;
                let span = start.merge(&value.span);
                arguments.push(Argument::Named(NamedArgument { name, value, span }));
                seen_named = true;
            } else {
                let span = self.current_span();
                let value = self.expression()?;
                if seen_named {
                    return Err(ParserError::general(
                        "Positional argument cannot follow a named argument",
                        span,
                    ));
                }
                arguments.push(Argument::Positional(value));
            }

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(arguments)
    }
}
