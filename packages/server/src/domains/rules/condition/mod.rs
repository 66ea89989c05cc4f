//! Condition expression language for rule matching.
//!
//! Conditions are JSON-shaped boolean expression trees evaluated against an
//! event payload. A node is a scalar, an array of nodes, or an operator
//! object: exactly one key drawn from [`ALLOWED_OPERATORS`], whose value is
//! the operand list. The whitelist is the security boundary: no reflection,
//! no user code, no I/O from expressions.
//!
//! [`validate`] runs before persistence and again before evaluation;
//! [`evaluate`] coerces the final result to a boolean via truthiness.

mod eval;
mod validate;

pub use eval::{evaluate, truthy};
pub use validate::validate;

/// Maximum nesting depth of a condition tree.
pub const MAX_DEPTH: usize = 10;

/// Maximum number of operator nodes across the whole tree.
pub const MAX_OPERATORS: usize = 50;

/// The full operator whitelist. Anything else fails validation.
pub const ALLOWED_OPERATORS: &[&str] = &[
    // comparison
    "==", "===", "!=", "!==", ">", ">=", "<", "<=",
    // boolean
    "and", "or", "!",
    // variable access
    "var",
    // membership
    "missing", "missing_some", "in",
    // conditional
    "if",
    // arithmetic
    "+", "-", "*", "/", "%", "min", "max",
    // string
    "cat", "substr", "length",
];

#[derive(Debug, thiserror::Error)]
pub enum ConditionError {
    #[error("Operator not allowed: {0}")]
    OperatorNotAllowed(String),

    #[error("Condition exceeds the maximum nesting depth of {0}")]
    MaxDepthExceeded(usize),

    #[error("Condition exceeds the maximum operator count of {0}")]
    MaxOperatorsExceeded(usize),

    #[error("Condition root must be an operator object")]
    InvalidRoot,

    #[error("Operator object must have exactly one key, found {0}")]
    MalformedOperator(usize),

    #[error("{0}")]
    Eval(String),
}

impl ConditionError {
    /// Evaluation errors are recorded per rule execution; validation errors
    /// reject the condition before it is ever persisted.
    pub fn is_eval(&self) -> bool {
        matches!(self, Self::Eval(_))
    }
}
