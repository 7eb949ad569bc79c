//! Embedded expression language for scripted filters
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := not ( "&&" not )*
//! not        := "!" not | comparison
//! comparison := operand ( ("==" | "!=") operand | "in" "[" operand ("," operand)* "]" )?
//! operand    := "(" expr ")" | string | integer | true | false | null | path
//! path       := ident ( "." ident )*
//! ```

mod eval;
mod lexer;
mod parser;

use std::fmt;

use scanpilot_core::FilterableView;
use thiserror::Error;

pub use parser::{parse_expression, CompareOp, Expr};

/// Errors raised while compiling or evaluating an expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown property 'finding.{0}'")]
    UnknownProperty(String),

    #[error("type error: {0}")]
    Type(String),
}

/// Runtime value of an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl ExprValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ExprValue::Str(_) => "string",
            ExprValue::Int(_) => "integer",
            ExprValue::Bool(_) => "boolean",
            ExprValue::Null => "null",
        }
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprValue::Str(s) => write!(f, "'{}'", s),
            ExprValue::Int(n) => write!(f, "{}", n),
            ExprValue::Bool(b) => write!(f, "{}", b),
            ExprValue::Null => write!(f, "null"),
        }
    }
}

/// A language scripted filters can be written in
pub trait ExpressionLanguage: Send + Sync {
    fn name(&self) -> &str;

    /// Parse and check an expression once, before any finding is evaluated
    fn compile(&self, source: &str) -> Result<Box<dyn CompiledExpression>, ExprError>;
}

/// A compiled expression, evaluated once per finding
pub trait CompiledExpression: fmt::Debug + Send + Sync {
    fn evaluate(&self, view: &FilterableView) -> Result<ExprValue, ExprError>;
}

/// The built-in language described in the module docs
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLanguage;

impl ExpressionLanguage for BuiltinLanguage {
    fn name(&self) -> &str {
        "builtin"
    }

    fn compile(&self, source: &str) -> Result<Box<dyn CompiledExpression>, ExprError> {
        Ok(Box::new(parse_expression(source)?))
    }
}

impl CompiledExpression for Expr {
    fn evaluate(&self, view: &FilterableView) -> Result<ExprValue, ExprError> {
        eval::evaluate(self, view)
    }
}
