//! Tokenizer for filter expressions

use super::ExprError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    Null,
    In,
    Eq,
    NotEq,
    Not,
    And,
    Or,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            index: 0,
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<Option<Token>, ExprError> {
        self.skip_whitespace();
        if self.index >= self.bytes.len() {
            return Ok(None);
        }

        let ch = self.bytes[self.index];
        let token = match ch {
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b',' => self.single(Token::Comma),
            b'.' => self.single(Token::Dot),
            b'\'' | b'"' => self.lex_string(ch)?,
            b'=' => self.pair(b'=', Token::Eq)?,
            b'&' => self.pair(b'&', Token::And)?,
            b'|' => self.pair(b'|', Token::Or)?,
            b'!' => {
                if self.peek_at(1) == Some(b'=') {
                    self.index += 2;
                    Token::NotEq
                } else {
                    self.single(Token::Not)
                }
            }
            b'0'..=b'9' => self.lex_number()?,
            _ if is_ident_start(ch) => self.lex_identifier(),
            _ => return Err(self.unexpected()),
        };
        Ok(Some(token))
    }

    fn single(&mut self, token: Token) -> Token {
        self.index += 1;
        token
    }

    /// Two-character operator made of `first` followed by `second`
    fn pair(&mut self, second: u8, token: Token) -> Result<Token, ExprError> {
        if self.peek_at(1) == Some(second) {
            self.index += 2;
            Ok(token)
        } else {
            Err(self.unexpected())
        }
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn unexpected(&self) -> ExprError {
        let ch = self.input[self.index..].chars().next().unwrap_or('?');
        ExprError::UnexpectedChar {
            ch,
            offset: self.index,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.index < self.bytes.len() && self.bytes[self.index].is_ascii_whitespace() {
            self.index += 1;
        }
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token, ExprError> {
        let start = self.index;
        self.index += 1;
        let mut out = String::new();
        let mut segment = self.index;

        while self.index < self.bytes.len() {
            let ch = self.bytes[self.index];
            if ch == quote {
                out.push_str(&self.input[segment..self.index]);
                self.index += 1;
                return Ok(Token::Str(out));
            }
            if ch == b'\\' {
                if let Some(escaped) = self.input[self.index + 1..].chars().next() {
                    out.push_str(&self.input[segment..self.index]);
                    out.push(escaped);
                    self.index += 1 + escaped.len_utf8();
                    segment = self.index;
                    continue;
                }
            }
            self.index += 1;
        }

        Err(ExprError::UnterminatedString { offset: start })
    }

    fn lex_number(&mut self) -> Result<Token, ExprError> {
        let start = self.index;
        while self.index < self.bytes.len() && self.bytes[self.index].is_ascii_digit() {
            self.index += 1;
        }
        self.input[start..self.index]
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|e| ExprError::Syntax(format!("invalid integer at offset {}: {}", start, e)))
    }

    fn lex_identifier(&mut self) -> Token {
        let start = self.index;
        self.index += 1;
        while self.index < self.bytes.len() && is_ident_continue(self.bytes[self.index]) {
            self.index += 1;
        }
        match &self.input[start..self.index] {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            ident => Token::Ident(ident.to_string()),
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}
