//! Recursive-descent parser for filter expressions

use super::lexer::{Lexer, Token};
use super::{ExprError, ExprValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(ExprValue),
    /// Dotted path such as `finding.severity`
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        lhs: Box<Expr>,
        op: CompareOp,
        rhs: Box<Expr>,
    },
    In {
        needle: Box<Expr>,
        haystack: Vec<Expr>,
    },
}

/// Parse a complete expression; trailing input is an error
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_or()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Deepest `!` / parenthesis nesting a script may use
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            lookahead: None,
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExprError::Syntax(format!(
                "expression nested deeper than {} levels",
                MAX_NESTING
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_and()?;
        while self.peek_is(&Token::Or)? {
            self.next_token()?;
            let rhs = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_not()?;
        while self.peek_is(&Token::And)? {
            self.next_token()?;
            let rhs = self.parse_not()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek_is(&Token::Not)? {
            self.next_token()?;
            self.enter()?;
            let expr = self.parse_not()?;
            self.leave();
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_operand()?;

        let op = match self.peek_token()? {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::NotEq) => CompareOp::NotEq,
            Some(Token::In) => {
                self.next_token()?;
                return self.parse_in(lhs);
            }
            _ => return Ok(lhs),
        };
        self.next_token()?;

        let rhs = self.parse_operand()?;
        Ok(Expr::Compare {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        })
    }

    fn parse_in(&mut self, needle: Expr) -> Result<Expr, ExprError> {
        self.expect_token(&Token::LBracket)?;
        let mut haystack = Vec::new();
        if !self.peek_is(&Token::RBracket)? {
            loop {
                haystack.push(self.parse_operand()?);
                if self.peek_is(&Token::Comma)? {
                    self.next_token()?;
                } else {
                    break;
                }
            }
        }
        self.expect_token(&Token::RBracket)?;
        Ok(Expr::In {
            needle: Box::new(needle),
            haystack,
        })
    }

    fn parse_operand(&mut self) -> Result<Expr, ExprError> {
        let token = self
            .next_token()?
            .ok_or_else(|| ExprError::Syntax(String::from("expected a value, found end of input")))?;

        match token {
            Token::LParen => {
                self.enter()?;
                let expr = self.parse_or()?;
                self.expect_token(&Token::RParen)?;
                self.leave();
                Ok(expr)
            }
            Token::Str(s) => Ok(Expr::Literal(ExprValue::Str(s))),
            Token::Int(n) => Ok(Expr::Literal(ExprValue::Int(n))),
            Token::True => Ok(Expr::Literal(ExprValue::Bool(true))),
            Token::False => Ok(Expr::Literal(ExprValue::Bool(false))),
            Token::Null => Ok(Expr::Literal(ExprValue::Null)),
            Token::Ident(root) => self.parse_path(root),
            other => Err(ExprError::Syntax(format!("unexpected {:?}", other))),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, ExprError> {
        let mut segments = vec![root];
        while self.peek_is(&Token::Dot)? {
            self.next_token()?;
            match self.next_token()? {
                Some(Token::Ident(name)) => segments.push(name),
                other => {
                    return Err(ExprError::Syntax(format!(
                        "expected property name after '.', found {:?}",
                        other
                    )))
                }
            }
        }
        Ok(Expr::Path(segments))
    }

    fn expect_token(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.next_token()? {
            Some(token) if &token == expected => Ok(()),
            other => Err(ExprError::Syntax(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn peek_is(&mut self, token: &Token) -> Result<bool, ExprError> {
        Ok(matches!(self.peek_token()?, Some(current) if current == token))
    }

    fn peek_token(&mut self) -> Result<Option<&Token>, ExprError> {
        if self.lookahead.is_none() {
            self.lookahead = self.lexer.next_token()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn next_token(&mut self) -> Result<Option<Token>, ExprError> {
        match self.lookahead.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        match self.next_token()? {
            None => Ok(()),
            Some(token) => Err(ExprError::Syntax(format!(
                "unexpected trailing {:?}",
                token
            ))),
        }
    }
}
