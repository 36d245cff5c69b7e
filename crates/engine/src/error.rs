//! Engine-level error types.

use actions::ValidationError;
use thiserror::Error;
use uuid::Uuid;

use crate::orchestrator::TransitionFailure;
use crate::store::StoreError;
use crate::validation::TemplateError;

/// Errors produced by the stage orchestrator.
///
/// Everything except [`EngineError::BatchFailed`] is raised before any
/// application is touched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The target stage is not part of the form's template.
    #[error("form '{form_name}' has no stage '{stage}'")]
    UnknownStage { form_name: String, stage: String },

    /// The actor's role is not in the stage's `allowedUserRoles`.
    #[error("user {actor} (role {role:?}) may not move applications to '{stage}'")]
    Unauthorized {
        actor: Uuid,
        role: Option<String>,
        stage: String,
    },

    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    /// Submission attempted outside the template's availability window.
    #[error("form '{0}' is not accepting applications")]
    TemplateClosed(String),

    /// Not a single application in the batch could be transitioned.
    #[error("no application could be moved to '{stage}' ({} failed)", failures.len())]
    BatchFailed {
        stage: String,
        failures: Vec<TransitionFailure>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid action: {0}")]
    Validation(#[from] ValidationError),
}
