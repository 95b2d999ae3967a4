//! Lexer/Scanner for Lumo source code.

use crate::error::LexerError;
use crate::lexer::token::{TemplatePart, Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source code into a stream of tokens.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::at(source, 1, 1)
    }

    /// Scanner whose positions start at `line`/`column`, used for the code
    /// spliced into template strings.
    pub fn at(source: &'a str, line: usize, column: usize) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line,
            column,
            start_pos: 0,
            start_line: line,
            start_column: column,
        }
    }

    /// Scan all tokens from the source.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments()?;
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            return Ok(Token::eof(self.current_pos, self.line, self.column));
        };

        match c {
            '(' => Ok(self.make_token(TokenKind::LeftParen)),
            ')' => Ok(self.make_token(TokenKind::RightParen)),
            '{' => Ok(self.make_token(TokenKind::LeftBrace)),
            '}' => Ok(self.make_token(TokenKind::RightBrace)),
            '[' => Ok(self.make_token(TokenKind::LeftBracket)),
            ']' => Ok(self.make_token(TokenKind::RightBracket)),
            ',' => Ok(self.make_token(TokenKind::Comma)),
            ';' => Ok(self.make_token(TokenKind::Semicolon)),
            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    Ok(self.make_token(TokenKind::Spread))
                } else {
                    Ok(self.make_token(TokenKind::Dot))
                }
            }
            ':' => {
                if self.match_char(':') {
                    Ok(self.make_token(TokenKind::DoubleColon))
                } else {
                    Ok(self.make_token(TokenKind::Colon))
                }
            }
            '?' => {
                if self.match_char('?') {
                    Ok(self.make_token(TokenKind::NullishCoalescing))
                } else if self.match_char('!') {
                    Ok(self.make_token(TokenKind::ErrorCoalescing))
                } else {
                    Ok(self.make_token(TokenKind::Question))
                }
            }
            '+' => Ok(self.with_equal(TokenKind::PlusEqual, TokenKind::Plus)),
            '-' => Ok(self.with_equal(TokenKind::MinusEqual, TokenKind::Minus)),
            '*' => {
                if self.match_char('*') {
                    Ok(self.make_token(TokenKind::StarStar))
                } else {
                    Ok(self.with_equal(TokenKind::StarEqual, TokenKind::Star))
                }
            }
            '/' => Ok(self.with_equal(TokenKind::SlashEqual, TokenKind::Slash)),
            '%' => Ok(self.with_equal(TokenKind::PercentEqual, TokenKind::Percent)),
            '!' => Ok(self.with_equal(TokenKind::BangEqual, TokenKind::Bang)),
            '<' => Ok(self.with_equal(TokenKind::LessEqual, TokenKind::Less)),
            '>' => Ok(self.with_equal(TokenKind::GreaterEqual, TokenKind::Greater)),
            '=' => {
                if self.match_char('=') {
                    Ok(self.make_token(TokenKind::EqualEqual))
                } else if self.match_char('>') {
                    Ok(self.make_token(TokenKind::FatArrow))
                } else {
                    Ok(self.make_token(TokenKind::Equal))
                }
            }
            '&' if self.match_char('&') => Ok(self.make_token(TokenKind::And)),
            '|' if self.match_char('|') => Ok(self.make_token(TokenKind::Or)),

            '"' | '\'' => self.scan_string(c),
            '`' => self.scan_template(),

            c if c.is_ascii_digit() => self.scan_number(c),
            c if c.is_alphabetic() || c == '_' => self.scan_identifier(c),

            _ => Err(LexerError::unexpected_char(c, self.current_span())),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexerError> {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.advance();
                    self.newline();
                }
                Some('/') => {
                    if self.peek_next() == Some('/') {
                        while self.peek().is_some() && self.peek() != Some('\n') {
                            self.advance();
                        }
                    } else if self.peek_next() == Some('*') {
                        self.mark_start();
                        self.advance();
                        self.advance();
                        let mut depth = 1;
                        while depth > 0 {
                            match self.peek() {
                                None => {
                                    return Err(LexerError::unterminated_comment(
                                        self.current_span(),
                                    ))
                                }
                                Some('*') if self.peek_next() == Some('/') => {
                                    self.advance();
                                    self.advance();
                                    depth -= 1;
                                }
                                Some('/') if self.peek_next() == Some('*') => {
                                    self.advance();
                                    self.advance();
                                    depth += 1;
                                }
                                Some('\n') => {
                                    self.advance();
                                    self.newline();
                                }
                                _ => {
                                    self.advance();
                                }
                            }
                        }
                    } else {
                        return Ok(());
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, LexerError> {
        let mut value = String::new();

        loop {
            match self.advance() {
                None | Some((_, '\n')) => {
                    return Err(LexerError::unterminated_string(self.current_span()));
                }
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => value.push(self.scan_escape()?),
                Some((_, c)) => value.push(c),
            }
        }

        Ok(self.make_token(TokenKind::StringLiteral(value)))
    }

    /// Decode the character after a backslash.
    fn scan_escape(&mut self) -> Result<char, LexerError> {
        let Some((_, c)) = self.advance() else {
            return Err(LexerError::unterminated_string(self.current_span()));
        };
        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            '0' => Ok('\0'),
            '\\' | '"' | '\'' | '`' | '$' => Ok(c),
            'u' => {
                if !self.match_char('{') {
                    return Err(LexerError::invalid_escape('u', self.current_span()));
                }
                let mut hex = String::new();
                while let Some(h) = self.peek() {
                    if h == '}' {
                        break;
                    }
                    hex.push(h);
                    self.advance();
                }
                if !self.match_char('}') {
                    return Err(LexerError::invalid_escape('u', self.current_span()));
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| LexerError::invalid_escape('u', self.current_span()))
            }
            other => Err(LexerError::invalid_escape(other, self.current_span())),
        }
    }

    /// Scan a backtick template. Text is decoded here; `${...}` splices are
    /// kept as source and scanned again by the parser.
    fn scan_template(&mut self) -> Result<Token, LexerError> {
        let mut parts = Vec::new();
        let mut text = String::new();

        loop {
            match self.advance() {
                None => return Err(LexerError::unterminated_string(self.current_span())),
                Some((_, '`')) => break,
                Some((_, '\\')) => text.push(self.scan_escape()?),
                Some((_, '\n')) => {
                    text.push('\n');
                    self.newline();
                }
                Some((_, '$')) if self.peek() == Some('{') => {
                    self.advance();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let code_span = Span::new(self.current_pos, self.current_pos, self.line, self.column);
                    let code_start = self.current_pos;
                    let mut depth = 1;
                    loop {
                        match self.peek() {
                            None => {
                                return Err(LexerError::unterminated_string(self.current_span()))
                            }
                            Some('{') => depth += 1,
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            Some('\n') => {
                                self.advance();
                                self.newline();
                                continue;
                            }
                            _ => {}
                        }
                        self.advance();
                    }
                    let code = self.source[code_start..self.current_pos].to_string();
                    self.advance();
                    parts.push(TemplatePart::Code(code, code_span));
                }
                Some((_, c)) => text.push(c),
            }
        }

        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(self.make_token(TokenKind::TemplateString(parts)))
    }

    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        let mut value = String::from(first);
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                // `1.foo` is a property access, not a float
                match self.peek_next() {
                    Some(next) if next.is_ascii_digit() => {
                        is_float = true;
                        value.push(c);
                        self.advance();
                    }
                    _ => break,
                }
            } else if c == '_' {
                self.advance();
            } else if c == 'e' || c == 'E' {
                let next = self.peek_next();
                let signed = matches!(next, Some('+' | '-'));
                let digit_after = if signed {
                    self.source[self.current_pos..].chars().nth(2)
                } else {
                    next
                };
                if !digit_after.is_some_and(|d| d.is_ascii_digit()) {
                    break;
                }
                value.push('e');
                self.advance();
                if signed {
                    if let Some((_, sign)) = self.advance() {
                        value.push(sign);
                    }
                }
                is_float = true;
            } else {
                break;
            }
        }

        let n: f64 = value
            .parse()
            .map_err(|_| LexerError::invalid_number(value.clone(), self.current_span()))?;
        Ok(self.make_token(TokenKind::Number(n)))
    }

    fn scan_identifier(&mut self, first: char) -> Result<Token, LexerError> {
        let mut value = String::from(first);

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier(value));
        Ok(self.make_token(kind))
    }

    fn with_equal(&mut self, with: TokenKind, without: TokenKind) -> Token {
        if self.match_char('=') {
            self.make_token(with)
        } else {
            self.make_token(without)
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.column = 1;
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            scan("( ) { } [ ] , . ; :: ..."),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Semicolon,
                TokenKind::DoubleColon,
                TokenKind::Spread,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            scan("42 3.25 1_000 2e3 7.foo"),
            vec![
                TokenKind::Number(42.0),
                TokenKind::Number(3.25),
                TokenKind::Number(1000.0),
                TokenKind::Number(2000.0),
                TokenKind::Number(7.0),
                TokenKind::Dot,
                TokenKind::Identifier("foo".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            scan(r#""a\nb" 'it\'s' "\u{41}""#),
            vec![
                TokenKind::StringLiteral("a\nb".to_string()),
                TokenKind::StringLiteral("it's".to_string()),
                TokenKind::StringLiteral("A".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            scan("let const var loop yield foo"),
            vec![
                TokenKind::Let,
                TokenKind::Const,
                TokenKind::Var,
                TokenKind::Loop,
                TokenKind::Yield,
                TokenKind::Identifier("foo".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            scan("+= ** ?? ?! ? => == != <= && ||"),
            vec![
                TokenKind::PlusEqual,
                TokenKind::StarStar,
                TokenKind::NullishCoalescing,
                TokenKind::ErrorCoalescing,
                TokenKind::Question,
                TokenKind::FatArrow,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessEqual,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            scan("1 // line\n/* outer /* inner */ */ 2"),
            vec![TokenKind::Number(1.0), TokenKind::Number(2.0), TokenKind::Eof]
        );
    }

    #[test]
    fn test_unterminated_comment_is_an_error() {
        assert!(matches!(
            Scanner::new("/* open").scan_tokens(),
            Err(LexerError::UnterminatedComment(_))
        ));
    }

    #[test]
    fn test_template_string() {
        let kinds = scan("`hi ${name}!`");
        match &kinds[0] {
            TokenKind::TemplateString(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], TemplatePart::Text("hi ".to_string()));
                assert!(matches!(&parts[1], TemplatePart::Code(code, _) if code == "name"));
                assert_eq!(parts[2], TemplatePart::Text("!".to_string()));
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn test_line_tracking() {
        let tokens = Scanner::new("a\n  b").scan_tokens().unwrap();
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }
}
