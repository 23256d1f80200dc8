use std::str::Chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,
    /// Cell address, sheet name or function name (may contain `$`)
    Ident,
    /// Quoted sheet name, `'My Sheet'`
    Quoted,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Colon,
    Comma,
    Bang,

    // Delimiters
    LParen,
    RParen,

    // Special
    Eof,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, text: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            text: text.into(),
        }
    }
}

/// Tokenizer for formula text (without the leading `=`)
pub struct Lexer<'a> {
    source: &'a str,
    chars: Chars<'a>,
    pos: usize,
    current: Option<char>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let current = chars.next();
        Self {
            source,
            chars,
            pos: 0,
            current,
        }
    }

    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.current;
        self.current = self.chars.next();
        if let Some(c) = c {
            self.pos += c.len_utf8();
        }
        c
    }

    fn peek(&self) -> Option<char> {
        self.current
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.advance();
        Token::new(kind, Span::new(start, self.pos), &self.source[start..self.pos])
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent, only when followed by digits: 1e3, 2.5E-2
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut ahead = self.chars.clone();
            let next = ahead.next();
            let digit_follows = match next {
                Some('+' | '-') => ahead.next().is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if digit_follows {
                self.advance();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.advance();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        Token::new(
            TokenKind::Number,
            Span::new(start, self.pos),
            &self.source[start..self.pos],
        )
    }

    fn read_ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.advance();
        }
        Token::new(
            TokenKind::Ident,
            Span::new(start, self.pos),
            &self.source[start..self.pos],
        )
    }

    fn read_quoted(&mut self) -> Token {
        let start = self.pos;
        self.advance(); // opening quote
        let mut name = String::new();
        loop {
            match self.advance() {
                Some('\'') => {
                    // '' is an escaped quote
                    if self.peek() == Some('\'') {
                        self.advance();
                        name.push('\'');
                    } else {
                        return Token::new(TokenKind::Quoted, Span::new(start, self.pos), name);
                    }
                }
                Some(c) => name.push(c),
                None => {
                    return Token::new(
                        TokenKind::Error,
                        Span::new(start, self.pos),
                        &self.source[start..self.pos],
                    );
                }
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start = self.pos;

        let Some(c) = self.peek() else {
            return Token::new(TokenKind::Eof, Span::new(start, start), "");
        };

        match c {
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            ':' => self.single(TokenKind::Colon),
            ',' | ';' => self.single(TokenKind::Comma),
            '!' => self.single(TokenKind::Bang),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '\'' => self.read_quoted(),
            '.' if self.peek_next().is_some_and(|n| n.is_ascii_digit()) => self.read_number(),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' || c == '$' => self.read_ident(),
            _ => self.single(TokenKind::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenize(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_numbers() {
        let tokens = Lexer::tokenize("100 8.5 .25 1e3 2.5E-2");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["100", "8.5", ".25", "1e3", "2.5E-2", ""]);
    }

    #[test]
    fn test_minus_is_always_an_operator() {
        assert_eq!(
            kinds("A1-2"),
            vec![TokenKind::Ident, TokenKind::Minus, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn test_references_and_ranges() {
        let tokens = Lexer::tokenize("Sheet2!$B$3:C4");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Bang,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[2].text, "$B$3");
    }

    #[test]
    fn test_quoted_sheet_name() {
        let tokens = Lexer::tokenize("'Bob''s data'!A1");
        assert_eq!(tokens[0].kind, TokenKind::Quoted);
        assert_eq!(tokens[0].text, "Bob's data");
        assert_eq!(tokens[1].kind, TokenKind::Bang);
    }

    #[test]
    fn test_unterminated_quote_is_error() {
        assert_eq!(kinds("'abc"), vec![TokenKind::Error, TokenKind::Eof]);
    }

    #[test]
    fn test_function_call() {
        assert_eq!(
            kinds("SUM(A1, 2)"),
            vec![
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unknown_character() {
        assert_eq!(kinds("A1 & 2")[1], TokenKind::Error);
    }
}
