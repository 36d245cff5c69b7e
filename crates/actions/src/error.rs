//! Action-level error types.

use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::registry::ActionKind;

/// Errors raised while building an action from its stored configuration.
///
/// These are always fatal and always raised before any side effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The `type` discriminator names no known action.
    #[error("unknown action type '{0}'")]
    UnknownActionType(String),

    /// A required key is absent, null or blank.
    #[error("{action}: missing required field '{field}'")]
    MissingField {
        action: ActionKind,
        field: &'static str,
    },

    /// A key is present but has the wrong JSON type.
    #[error("{action}: field '{field}' must be {expected}")]
    InvalidType {
        action: ActionKind,
        field: &'static str,
        expected: &'static str,
    },

    /// A key holds a value outside its enumerated set.
    #[error("{action}: field '{field}' must be one of {allowed:?}, got '{value}'")]
    NotAllowed {
        action: ActionKind,
        field: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },

    /// A numeric key is outside its permitted range.
    #[error("{action}: field '{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        action: ActionKind,
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    /// A key that must hold an absolute http(s) URL does not.
    #[error("{action}: field '{field}' is not a valid URL: '{value}'")]
    InvalidUrl {
        action: ActionKind,
        field: &'static str,
        value: String,
    },

    /// Any other field-level constraint.
    #[error("{action}: field '{field}' {reason}")]
    Invalid {
        action: ActionKind,
        field: &'static str,
        reason: String,
    },
}

/// Errors returned by [`crate::ActionExecutor::execute`].
///
/// The orchestrator contains these to the application being processed.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The data context lacks a value the action needs (e.g. `email`).
    #[error("context has no usable '{0}' field")]
    MissingContextField(String),

    /// A rendered URL could not be parsed.
    #[error("invalid request url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// A remote endpoint answered with a non-success status.
    #[error("{method} {url} returned HTTP {status}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
    },

    /// A collaborator (mail, HTTP, database, files, SMS) failed.
    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: CollaboratorError,
    },
}

impl ActionError {
    pub(crate) fn collaborator(collaborator: &'static str) -> impl FnOnce(CollaboratorError) -> Self {
        move |source| Self::Collaborator {
            collaborator,
            source,
        }
    }
}
