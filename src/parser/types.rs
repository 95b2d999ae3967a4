//! Type annotation parsing.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn parse_type(&mut self) -> ParseResult<TypeAnnotation> {
        let start_span = self.current_span();

        let base_type = match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                TypeAnnotation::new(TypeKind::Named(name), start_span)
            }
            TokenKind::Null => {
                self.advance();
                TypeAnnotation::new(TypeKind::Named("null".to_string()), start_span)
            }
            TokenKind::LeftBracket => {
                self.advance();
                let element = self.parse_type()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = start_span.merge(&self.previous_span());
                TypeAnnotation::new(TypeKind::List(Box::new(element)), span)
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut fields = Vec::new();
                while !self.check(&TokenKind::RightBrace) {
                    let name = self.expect_identifier()?;
                    self.expect(&TokenKind::DoubleColon)?;
                    fields.push((name, self.parse_type()?));
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RightBrace)?;
                let span = start_span.merge(&self.previous_span());
                TypeAnnotation::new(TypeKind::Object(fields), span)
            }
            _ => {
                return Err(ParserError::unexpected_token(
                    "type",
                    format!("{}", self.peek().kind),
                    self.current_span(),
                ));
            }
        };

        if self.match_token(&TokenKind::Question) {
            let span = start_span.merge(&self.previous_span());
            return Ok(TypeAnnotation::new(TypeKind::Nullable(Box::new(base_type)), span));
        }

        Ok(base_type)
    }
}
