//! ScanPilot Filter - caller policy evaluation over findings
//!
//! SAST and SCA findings each have their own filters (`FilterSet`). Per
//! engine, two mutually exclusive modes are supported:
//! - declarative: `(attribute, value)` constraints, ANDed across attributes
//! - scripted: one boolean expression over `finding.<property>`
//!
//! The expression language sits behind `ExpressionLanguage`, so the built-in
//! language can be swapped without touching the engine.

pub mod engine;
pub mod expr;

pub use engine::{passes, FilterEngine, FilterSet};
pub use expr::{BuiltinLanguage, CompiledExpression, ExprError, ExprValue, ExpressionLanguage};
