//! Template validation, run before persisting or using a template.
//!
//! Rules enforced:
//! 1. The template has at least one stage and stage names are unique.
//! 2. `initialStage` and `finalStage` name existing stages.
//! 3. Every `allowedTransitions` entry names an existing stage.
//! 4. No stage carries an action of an unrecognized type.
//! 5. The availability window, when fully set, is not inverted.

use std::collections::HashSet;

use actions::StageAction;
use thiserror::Error;

use crate::models::ApplicationTemplate;

/// Why a template was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template has no stages")]
    NoStages,

    /// Two or more stages share the same name.
    #[error("duplicate stage name: '{0}'")]
    DuplicateStage(String),

    /// `initialStage` / `finalStage` references a stage that doesn't exist.
    #[error("{role} stage '{stage}' is not defined")]
    UnknownBoundaryStage { role: &'static str, stage: String },

    /// An `allowedTransitions` entry references a stage that doesn't exist.
    #[error("stage '{stage}' allows a transition to unknown stage '{target}'")]
    UnknownTransition { stage: String, target: String },

    #[error("stage '{stage}' action #{index} has unknown type '{action_type}'")]
    UnrecognizedAction {
        stage: String,
        index: usize,
        action_type: String,
    },

    #[error("template closes before it opens")]
    InvertedWindow,
}

/// Validate `template` and return the first problem found.
///
/// # Errors
/// See [`TemplateError`] for the individual rules.
pub fn validate_template(template: &ApplicationTemplate) -> Result<(), TemplateError> {
    if template.stages.is_empty() {
        return Err(TemplateError::NoStages);
    }

    // -----------------------------------------------------------------------
    // 1. Stage names are unique
    // -----------------------------------------------------------------------
    let mut names: HashSet<&str> = HashSet::new();
    for stage in &template.stages {
        if !names.insert(stage.name.as_str()) {
            return Err(TemplateError::DuplicateStage(stage.name.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Boundary stages exist
    // -----------------------------------------------------------------------
    for (role, stage) in [
        ("initial", &template.initial_stage),
        ("final", &template.final_stage),
    ] {
        if !names.contains(stage.as_str()) {
            return Err(TemplateError::UnknownBoundaryStage {
                role,
                stage: stage.clone(),
            });
        }
    }

    for stage in &template.stages {
        // -------------------------------------------------------------------
        // 3. Transition targets exist
        // -------------------------------------------------------------------
        if let Some(target) = stage
            .allowed_transitions
            .iter()
            .find(|t| !names.contains(t.as_str()))
        {
            return Err(TemplateError::UnknownTransition {
                stage: stage.name.clone(),
                target: target.clone(),
            });
        }

        // -------------------------------------------------------------------
        // 4. Actions are all of known types
        // -------------------------------------------------------------------
        for (index, action) in stage.actions.iter().enumerate() {
            if let StageAction::Unrecognized(def) = action {
                return Err(TemplateError::UnrecognizedAction {
                    stage: stage.name.clone(),
                    index,
                    action_type: def.action_type.clone(),
                });
            }
        }
    }

    if let (Some(opens), Some(closes)) = (template.opens_at, template.closes_at) {
        if closes < opens {
            return Err(TemplateError::InvertedWindow);
        }
    }

    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stage;
    use actions::ActionDefinition;
    use chrono::{Duration, Utc};

    fn stage(name: &str, transitions: &[&str]) -> Stage {
        Stage {
            allowed_transitions: transitions.iter().map(|t| t.to_string()).collect(),
            ..Stage::new(name)
        }
    }

    fn make_template(stages: Vec<Stage>) -> ApplicationTemplate {
        ApplicationTemplate::new("licence", stages, "Submitted", "Approved")
    }

    #[test]
    fn valid_template_passes() {
        let template = make_template(vec![
            stage("Submitted", &["Review"]),
            stage("Review", &["Approved", "Submitted"]),
            stage("Approved", &[]),
        ]);
        assert_eq!(validate_template(&template), Ok(()));
    }

    #[test]
    fn empty_template_is_rejected() {
        assert_eq!(
            validate_template(&make_template(vec![])),
            Err(TemplateError::NoStages)
        );
    }

    #[test]
    fn duplicate_stage_name_is_rejected() {
        let template = make_template(vec![
            stage("Submitted", &[]),
            stage("Approved", &[]),
            stage("Submitted", &[]), // duplicate!
        ]);
        assert!(matches!(
            validate_template(&template),
            Err(TemplateError::DuplicateStage(name)) if name == "Submitted"
        ));
    }

    #[test]
    fn missing_boundary_stage_is_rejected() {
        let template = make_template(vec![stage("Submitted", &[])]);
        assert!(matches!(
            validate_template(&template),
            Err(TemplateError::UnknownBoundaryStage { role: "final", stage }) if stage == "Approved"
        ));
    }

    #[test]
    fn transition_to_missing_stage_is_rejected() {
        let template = make_template(vec![
            stage("Submitted", &["Ghost"]), // ghost doesn't exist
            stage("Approved", &[]),
        ]);
        assert!(matches!(
            validate_template(&template),
            Err(TemplateError::UnknownTransition { target, .. }) if target == "Ghost"
        ));
    }

    #[test]
    fn unrecognized_action_is_rejected() {
        let mut approved = stage("Approved", &[]);
        approved.actions.push(StageAction::Unrecognized(ActionDefinition {
            action_type: "legacy_fax".into(),
            config: Default::default(),
        }));
        let template = make_template(vec![stage("Submitted", &[]), approved]);

        assert_eq!(
            validate_template(&template),
            Err(TemplateError::UnrecognizedAction {
                stage: "Approved".into(),
                index: 0,
                action_type: "legacy_fax".into(),
            })
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut template = make_template(vec![stage("Submitted", &[]), stage("Approved", &[])]);
        let now = Utc::now();
        template.opens_at = Some(now);
        template.closes_at = Some(now - Duration::hours(1));
        assert_eq!(validate_template(&template), Err(TemplateError::InvertedWindow));
    }
}
