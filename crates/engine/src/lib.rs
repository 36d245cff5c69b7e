//! `engine` crate — application templates, stage transitions and their
//! audit trail.
//!
//! The [`StageOrchestrator`] is the entry point. Storage and authorization
//! are reached through the traits in [`store`]; actions run through
//! [`actions::ActionExecutor`].

pub mod error;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod settings;
pub mod store;
pub mod validation;

pub use error::EngineError;
pub use models::{ApplicationInstance, ApplicationTemplate, NewApplication, Stage, TimelineEntry};
pub use orchestrator::{
    CandidateStage, StageOrchestrator, TransitionFailure, TransitionReport, TransitionRequest,
};
pub use settings::{SettingsError, SettingsProvider};
pub use store::{RoleProvider, StoreError, StoreTransaction, WorkflowStore};
pub use validation::{validate_template, TemplateError};

#[cfg(test)]
mod orchestrator_tests;
