//! `criteria` crate — a pure predicate evaluator over JSON records.
//!
//! A criteria list is an ANDed set of `{field, operator, value}` clauses.
//! It gates stage behaviour and drives lookups such as fee selection and
//! renewal-date rules. Nothing here performs I/O.

pub mod error;
pub mod matcher;
pub mod operator;

pub use error::CriteriaError;
pub use matcher::{first_match, matches, matches_value, parse_criteria, Criterion};
pub use operator::Operator;
