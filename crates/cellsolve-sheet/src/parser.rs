use thiserror::Error;

use crate::ast::*;
use crate::lexer::{Lexer, Span, Token, TokenKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token: expected {expected}, found {found} at position {span:?}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("Unexpected end of formula")]
    UnexpectedEof,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Invalid cell reference: {0}")]
    InvalidReference(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// Recursive-descent parser for formula text.
///
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := unary (('*' | '/') unary)*
/// unary  := '-' unary | '+' unary | primary
/// primary:= number | ref (':' ref)? | name '(' args ')' | '(' expr ')'
/// ref    := (sheet '!')? address
/// ```
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse formula text. A leading `=` is accepted and skipped.
    pub fn parse(source: &str) -> Result<Expr, ParseError> {
        let source = source.trim_start();
        let source = source.strip_prefix('=').unwrap_or(source);
        let mut parser = Parser::new(Lexer::tokenize(source));
        let expr = parser.parse_expr()?;
        parser.expect(TokenKind::Eof)?;
        Ok(expr)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> TokenKind {
        self.current().map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn peek_kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        match self.current().cloned() {
            Some(t) if t.kind == kind => {
                self.advance();
                Ok(t)
            }
            Some(t) if t.kind == TokenKind::Eof => Err(ParseError::UnexpectedEof),
            Some(t) => Err(unexpected(format!("{kind:?}"), &t)),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Number => {
                let token = self.expect(TokenKind::Number)?;
                let value: f64 = token
                    .text
                    .parse()
                    .map_err(|_| ParseError::InvalidNumber(token.text.clone()))?;
                Ok(Expr::Number(value))
            }
            TokenKind::Ident if self.peek_kind_at(1) == TokenKind::LParen => self.parse_call(),
            TokenKind::Ident | TokenKind::Quoted => self.parse_reference(),
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(expr)))
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof),
            _ => {
                let token = self.current().cloned().unwrap_or_else(eof_token);
                Err(unexpected("number, reference, function or (", &token))
            }
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let name = self.expect(TokenKind::Ident)?;
        let function: Function = name.text.parse().map_err(ParseError::UnknownFunction)?;
        self.expect(TokenKind::LParen)?;

        let mut args = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                args.push(self.parse_expr()?);
                if self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(Expr::Call { function, args })
    }

    fn parse_reference(&mut self) -> Result<Expr, ParseError> {
        let (from, from_span) = self.parse_address()?;

        if self.peek_kind() != TokenKind::Colon {
            return Ok(Expr::Cell {
                span: from_span,
                address: from,
            });
        }
        self.advance();

        let (mut to, to_span) = self.parse_address()?;
        // The second corner inherits the first corner's sheet
        if to.sheet.is_none() {
            to.sheet = from.sheet.clone();
        } else if to.sheet != from.sheet {
            return Err(ParseError::InvalidReference(format!(
                "range corners on different sheets at {:?}",
                from_span.merge(to_span)
            )));
        }

        Ok(Expr::Range {
            span: from_span.merge(to_span),
            from,
            to,
        })
    }

    fn parse_address(&mut self) -> Result<(Address, Span), ParseError> {
        let first = match self.peek_kind() {
            TokenKind::Quoted => self.expect(TokenKind::Quoted)?,
            _ => self.expect(TokenKind::Ident)?,
        };

        let (sheet, cell) = if self.peek_kind() == TokenKind::Bang {
            self.advance();
            let cell = self.expect(TokenKind::Ident)?;
            (Some(first.text.clone()), cell)
        } else if first.kind == TokenKind::Quoted {
            return Err(ParseError::InvalidReference(format!("'{}' without a cell", first.text)));
        } else {
            (None, first.clone())
        };

        let span = first.span.merge(cell.span);
        let (row, column) =
            parse_a1(&cell.text).ok_or_else(|| ParseError::InvalidReference(cell.text.clone()))?;
        Ok((Address { sheet, row, column }, span))
    }
}

/// Zero-based `(row, column)` of an `A1`-style address; `$` markers are ignored
pub fn parse_a1(text: &str) -> Option<(u32, u32)> {
    let cell = cellsolve_core::CellRef::parse_a1(0, text)?;
    Some((cell.row, cell.column))
}

fn unexpected(expected: impl Into<String>, token: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        expected: expected.into(),
        found: format!("{:?} '{}'", token.kind, token.text),
        span: token.span,
    }
}

fn eof_token() -> Token {
    Token::new(TokenKind::Eof, Span::new(0, 0), "")
}
