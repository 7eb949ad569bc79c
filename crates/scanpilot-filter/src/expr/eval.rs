//! Tree-walking evaluator over a `FilterableView`

use scanpilot_core::FilterableView;

use super::parser::{CompareOp, Expr};
use super::{ExprError, ExprValue};

/// Name scripts use for the finding under evaluation
const ROOT: &str = "finding";

pub(crate) fn evaluate(expr: &Expr, view: &FilterableView) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => resolve(segments, view),
        Expr::Not(inner) => {
            let value = as_bool(evaluate(inner, view)?, "!")?;
            Ok(ExprValue::Bool(!value))
        }
        Expr::And(lhs, rhs) => {
            if !as_bool(evaluate(lhs, view)?, "&&")? {
                return Ok(ExprValue::Bool(false));
            }
            Ok(ExprValue::Bool(as_bool(evaluate(rhs, view)?, "&&")?))
        }
        Expr::Or(lhs, rhs) => {
            if as_bool(evaluate(lhs, view)?, "||")? {
                return Ok(ExprValue::Bool(true));
            }
            Ok(ExprValue::Bool(as_bool(evaluate(rhs, view)?, "||")?))
        }
        Expr::Compare { lhs, op, rhs } => {
            let equal = loosely_equal(&evaluate(lhs, view)?, &evaluate(rhs, view)?);
            Ok(ExprValue::Bool(match op {
                CompareOp::Eq => equal,
                CompareOp::NotEq => !equal,
            }))
        }
        Expr::In { needle, haystack } => {
            let needle = evaluate(needle, view)?;
            for candidate in haystack {
                if loosely_equal(&needle, &evaluate(candidate, view)?) {
                    return Ok(ExprValue::Bool(true));
                }
            }
            Ok(ExprValue::Bool(false))
        }
    }
}

fn resolve(segments: &[String], view: &FilterableView) -> Result<ExprValue, ExprError> {
    match segments {
        [root, property] if root == ROOT => match view.property(property) {
            Some(Some(value)) => Ok(ExprValue::Str(value.to_string())),
            Some(None) => Ok(ExprValue::Null),
            None => Err(ExprError::UnknownProperty(property.clone())),
        },
        [root] if root == ROOT => Err(ExprError::Type(String::from(
            "'finding' cannot be used as a value",
        ))),
        [root, rest @ ..] if root == ROOT => Err(ExprError::UnknownProperty(rest.join("."))),
        _ => Err(ExprError::UnknownIdentifier(segments.join("."))),
    }
}

fn as_bool(value: ExprValue, operator: &str) -> Result<bool, ExprError> {
    match value {
        ExprValue::Bool(b) => Ok(b),
        other => Err(ExprError::Type(format!(
            "operator '{}' expects boolean operands, got {} {}",
            operator,
            other.type_name(),
            other
        ))),
    }
}

/// Equality across types is false, except integers against their decimal
/// string form, since view attributes such as `cweId` are strings
fn loosely_equal(a: &ExprValue, b: &ExprValue) -> bool {
    match (a, b) {
        (ExprValue::Int(n), ExprValue::Str(s)) | (ExprValue::Str(s), ExprValue::Int(n)) => {
            s.trim() == n.to_string()
        }
        _ => a == b,
    }
}
