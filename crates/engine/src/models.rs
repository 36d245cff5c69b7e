//! Core domain models for the stage workflow.
//!
//! Templates and stages use the camelCase wire format they are authored and
//! persisted in (`initialStage`, `allowedUserRoles`, ...). Instances and
//! timeline entries are engine-owned and serialize in the same style.

use actions::StageAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One named state of an application template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Unique within the owning template; doubles as the instance `status`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Stages reachable from here. Shown to users, not enforced on transition.
    #[serde(default)]
    pub allowed_transitions: Vec<String>,
    /// Roles permitted to move applications *into* this stage.
    #[serde(default)]
    pub allowed_user_roles: Vec<String>,
    /// Executed in order on entry.
    #[serde(default)]
    pub actions: Vec<StageAction>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            allowed_transitions: Vec::new(),
            allowed_user_roles: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn allows_role(&self, role: &str) -> bool {
        self.allowed_user_roles.iter().any(|r| r == role)
    }
}

// ---------------------------------------------------------------------------
// ApplicationTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationTemplate {
    pub uuid: Uuid,
    pub form_name: String,
    pub stages: Vec<Stage>,
    pub initial_stage: String,
    pub final_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opens_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closes_at: Option<DateTime<Utc>>,
}

impl ApplicationTemplate {
    /// Convenience constructor for testing.
    pub fn new(
        form_name: impl Into<String>,
        stages: Vec<Stage>,
        initial_stage: impl Into<String>,
        final_stage: impl Into<String>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            form_name: form_name.into(),
            stages,
            initial_stage: initial_stage.into(),
            final_stage: final_stage.into(),
            opens_at: None,
            closes_at: None,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Whether submissions are accepted at `now`. Unset bounds are open.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.opens_at.map_or(true, |opens| opens <= now)
            && self.closes_at.map_or(true, |closes| now <= closes)
    }
}

// ---------------------------------------------------------------------------
// ApplicationInstance
// ---------------------------------------------------------------------------

/// A submitted application moving through its template's stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstance {
    pub uuid: Uuid,
    pub form_name: String,
    /// Name of the current stage.
    pub status: String,
    pub form_data: Map<String, Value>,
    /// Snapshot of the template taken at submission.
    pub template: ApplicationTemplate,
    pub submitted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationInstance {
    /// Fields that form data can never shadow in the action context.
    pub const RELATIONAL_FIELDS: [&'static str; 5] =
        ["uuid", "form_name", "status", "created_at", "updated_at"];

    /// The data context handed to actions: form data overlaid with the
    /// instance's own columns.
    pub fn context(&self) -> Map<String, Value> {
        let mut context = self.form_data.clone();
        context.insert("uuid".into(), Value::String(self.uuid.to_string()));
        context.insert("form_name".into(), Value::String(self.form_name.clone()));
        context.insert("status".into(), Value::String(self.status.clone()));
        context.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        context.insert("updated_at".into(), Value::String(self.updated_at.to_rfc3339()));
        context
    }

    pub fn current_stage(&self) -> Option<&Stage> {
        self.template.stage(&self.status)
    }

    /// The instance has reached its template's final stage.
    pub fn is_final(&self) -> bool {
        self.status == self.template.final_stage
    }
}

/// Input for [`crate::StageOrchestrator::create_application`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub form_name: String,
    #[serde(default)]
    pub form_data: Map<String, Value>,
    #[serde(default)]
    pub submitted_by: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// TimelineEntry
// ---------------------------------------------------------------------------

/// Immutable audit record of one transition, or of creation when
/// `from_status` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub uuid: Uuid,
    pub application_uuid: Uuid,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor: Option<Uuid>,
    pub actions_executed: Vec<String>,
    pub actions_results: Vec<Value>,
    pub submitted_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl TimelineEntry {
    /// The synthetic entry recording an instance's creation.
    pub fn creation(application: &ApplicationInstance) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            application_uuid: application.uuid,
            from_status: None,
            to_status: application.template.initial_stage.clone(),
            actor: application.submitted_by,
            actions_executed: Vec::new(),
            actions_results: Vec::new(),
            submitted_data: application.form_data.clone(),
            created_at: application.created_at,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.from_status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn instance(form_data: Value) -> ApplicationInstance {
        let template = ApplicationTemplate::new(
            "licence",
            vec![Stage::new("Submitted"), Stage::new("Approved")],
            "Submitted",
            "Approved",
        );
        let now = Utc::now();
        ApplicationInstance {
            uuid: Uuid::new_v4(),
            form_name: "licence".into(),
            status: "Submitted".into(),
            form_data: form_data.as_object().cloned().unwrap(),
            template,
            submitted_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn template_wire_format_is_camel_case() {
        let raw = json!({
            "uuid": "6f1c7b0e-4a4e-4d0a-9b55-2d7e3c1f0a11",
            "formName": "licence",
            "initialStage": "Submitted",
            "finalStage": "Approved",
            "stages": [
                {
                    "name": "Submitted",
                    "allowedTransitions": ["Approved"],
                    "allowedUserRoles": ["admin"],
                    "actions": [{ "type": "email", "config": { "template": "t", "subject": "s" } }]
                },
                { "name": "Approved", "description": "Done" }
            ]
        });

        let template: ApplicationTemplate = serde_json::from_value(raw).unwrap();
        assert_eq!(template.stages.len(), 2);
        assert_eq!(template.stage("Submitted").unwrap().allowed_transitions, vec!["Approved"]);
        assert!(template.stage("Approved").unwrap().actions.is_empty());

        let back = serde_json::to_value(&template).unwrap();
        assert_eq!(back["stages"][0]["allowedUserRoles"], json!(["admin"]));
        assert!(back.get("opensAt").is_none());
    }

    #[test]
    fn availability_window_bounds_are_inclusive() {
        let now = Utc::now();
        let mut template = ApplicationTemplate::new("f", vec![Stage::new("a")], "a", "a");
        assert!(template.is_open_at(now));

        template.opens_at = Some(now);
        template.closes_at = Some(now + Duration::days(1));
        assert!(template.is_open_at(now));
        assert!(!template.is_open_at(now - Duration::seconds(1)));
        assert!(!template.is_open_at(now + Duration::days(2)));
    }

    #[test]
    fn relational_fields_override_form_data() {
        let app = instance(json!({ "status": "forged", "uuid": "nope", "name": "Ada" }));
        let ctx = app.context();
        assert_eq!(ctx["status"], "Submitted");
        assert_eq!(ctx["uuid"], app.uuid.to_string());
        assert_eq!(ctx["name"], "Ada");
        for field in ApplicationInstance::RELATIONAL_FIELDS {
            assert!(ctx.contains_key(field), "context lacks {field}");
        }
    }

    #[test]
    fn final_stage_is_reported() {
        let mut app = instance(json!({}));
        assert!(!app.is_final());
        app.status = "Approved".into();
        assert!(app.is_final());
        assert_eq!(app.current_stage().unwrap().name, "Approved");
    }
}
