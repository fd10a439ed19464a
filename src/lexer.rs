use std::{iter::Peekable, str::Chars};

use crate::{
    error::{CompileError, Result},
    token::{Location, Token, TokenKind, KEYWORDS},
};

/// Scans the provided source, producing the token list (terminated by a
/// single `Eof` token). The first unexpected character aborts the scan.
pub fn lex(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).lex()
}

struct Lexer<'src> {
    iter: Peekable<Chars<'src>>,
    row: u32,
    col: u32,
    /// Location of the first character of the token being scanned.
    start: Location,
    tokens: Vec<Token>,
}

impl Lexer<'_> {
    fn new(src: &str) -> Lexer<'_> {
        Lexer {
            iter: src.chars().peekable(),
            row: 1,
            col: 1,
            start: Location::new(1, 1),
            tokens: Vec::with_capacity(src.len() / 4),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>> {
        loop {
            let next = self.scan_token_kind()?;
            let is_eof = next == TokenKind::Eof;
            self.produce(next);
            if is_eof {
                break;
            }
        }
        Ok(self.tokens)
    }

    fn scan_token_kind(&mut self) -> Result<TokenKind> {
        use TokenKind::*;
        loop {
            return Ok(match self.mark_advance() {
                '\0' => Eof,
                '+' => Plus,
                '-' => Minus,
                '*' => Star,
                '/' => match self.peek() {
                    '/' => {
                        self.line_comment();
                        continue;
                    }
                    _ => Slash,
                },
                '%' => Percent,
                '#' => {
                    self.line_comment();
                    continue;
                }
                '=' => match self.peek() {
                    '=' => self.advance_with(EqEq),
                    _ => Assign,
                },
                '!' => match self.peek() {
                    '=' => self.advance_with(NotEq),
                    c => return Err(self.unexpected(c)),
                },
                '<' => match self.peek() {
                    '=' => self.advance_with(LessEq),
                    _ => Less,
                },
                '>' => match self.peek() {
                    '=' => self.advance_with(GreaterEq),
                    _ => Greater,
                },
                ':' => Colon,
                ';' => Semicolon,
                ',' => Comma,
                '(' => LParen,
                ')' => RParen,
                '{' => LBrace,
                '}' => RBrace,
                c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(c),
                c if c.is_ascii_digit() => self.number(c)?,
                c if c.is_ascii_whitespace() => continue,
                c => return Err(self.unexpected(c)),
            });
        }
    }

    fn identifier_or_keyword(&mut self, first: char) -> TokenKind {
        let valid_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        let mut name = String::new();
        name.push(first);
        while valid_suffix(self.peek()) {
            name.push(self.advance());
        }
        match KEYWORDS.get(&name).cloned() {
            Some(keyword) => keyword,
            None => TokenKind::Identifier(name),
        }
    }

    fn number(&mut self, first: char) -> Result<TokenKind> {
        let mut digits = String::new();
        digits.push(first);
        while self.peek().is_ascii_digit() {
            digits.push(self.advance());
        }
        // The backend is 64-bit; a literal that doesn't fit is rejected here
        // rather than truncated later.
        let value: i64 = digits.parse().map_err(|_| CompileError::Syntax {
            loc: self.start,
            message: format!("integer literal `{digits}` does not fit in 64 bits"),
        })?;
        Ok(TokenKind::Int(value))
    }

    fn line_comment(&mut self) {
        while !matches!(self.peek(), '\n' | '\0') {
            self.advance();
        }
    }
}

impl Lexer<'_> {
    /// Starts a new token mark and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.start = Location::new(self.row, self.col);
        self.advance()
    }

    /// Returns the next character and advances the iterator, tracking the
    /// row/column cursor.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        if c == '\n' {
            self.row += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    /// Advances and returns the provided value.
    fn advance_with(&mut self, value: TokenKind) -> TokenKind {
        self.advance();
        value
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    fn produce(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(kind, self.start));
    }

    fn unexpected(&self, c: char) -> CompileError {
        CompileError::Syntax {
            loc: self.start,
            message: format!("unexpected character {c:?}"),
        }
    }
}
