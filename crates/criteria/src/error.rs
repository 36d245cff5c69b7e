//! Criteria configuration errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    /// The operator name is not one the matcher understands.
    #[error("unsupported criteria operator: '{0}'")]
    UnsupportedOperator(String),

    /// The criteria payload is not a list of `{field, operator, value}` objects.
    #[error("malformed criteria: {0}")]
    Malformed(String),
}
