//! Orchestrator tests against `MemoryStore` and the recording collaborators
//! from `actions::mock`, so no Postgres or network is required.

use std::sync::Arc;

use actions::mock::{MockCollaborators, MockMailer};
use actions::{Action, ActionDefinition, ActionExecutor, HttpResponse, StageAction};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use templating::TemplateEngine;
use uuid::Uuid;

use crate::memory::{MemoryStore, StaticRoles};
use crate::models::{ApplicationInstance, ApplicationTemplate, NewApplication, Stage};
use crate::orchestrator::{StageOrchestrator, TransitionRequest};
use crate::store::WorkflowStore;
use crate::validation::TemplateError;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const FORM: &str = "practitioner-licence";

fn action(kind: &str, config: Value) -> StageAction {
    let config = config.as_object().cloned().unwrap();
    Action::from_config(kind, &config).unwrap().into()
}

fn email(subject: &str) -> StageAction {
    action("email", json!({ "template": "Dear [name]", "subject": subject }))
}

fn stage(name: &str, roles: &[&str], transitions: &[&str], actions: Vec<StageAction>) -> Stage {
    Stage {
        description: format!("{name} stage"),
        allowed_transitions: transitions.iter().map(|s| s.to_string()).collect(),
        allowed_user_roles: roles.iter().map(|s| s.to_string()).collect(),
        actions,
        ..Stage::new(name)
    }
}

fn licence_template() -> ApplicationTemplate {
    ApplicationTemplate::new(
        FORM,
        vec![
            stage("Submitted", &["clerk"], &["Approved", "Rejected"], vec![email("Received")]),
            stage("Approved", &["admin"], &[], vec![email("Approved")]),
            stage("Rejected", &["admin", "clerk"], &[], vec![]),
        ],
        "Submitted",
        "Approved",
    )
}

fn form_data(name: &str) -> Map<String, Value> {
    json!({ "name": name, "email": format!("{}@example.org", name.to_lowercase()) })
        .as_object()
        .cloned()
        .unwrap()
}

struct Harness {
    orchestrator: StageOrchestrator,
    store: MemoryStore,
    mocks: MockCollaborators,
    admin: Uuid,
    clerk: Uuid,
}

impl Harness {
    async fn with(template: ApplicationTemplate, mocks: MockCollaborators) -> Self {
        let store = MemoryStore::new();
        let admin = Uuid::new_v4();
        let clerk = Uuid::new_v4();
        let roles = StaticRoles::new().with(admin, "admin").with(clerk, "clerk");
        let executor = ActionExecutor::new(TemplateEngine::new(), mocks.collaborators());
        let orchestrator = StageOrchestrator::new(Arc::new(store.clone()), Arc::new(roles), executor);

        orchestrator.save_template(&template).await.unwrap();
        Self {
            orchestrator,
            store,
            mocks,
            admin,
            clerk,
        }
    }

    async fn new() -> Self {
        Self::with(licence_template(), MockCollaborators::default()).await
    }

    async fn create(&self, name: &str) -> ApplicationInstance {
        self.orchestrator
            .create_application(NewApplication {
                form_name: FORM.into(),
                form_data: form_data(name),
                submitted_by: None,
            })
            .await
            .unwrap()
    }

    async fn status_of(&self, uuid: Uuid) -> String {
        self.store.find_application(uuid).await.unwrap().status
    }

    fn request(&self, target: &str, applications: Vec<Uuid>, actor: Uuid) -> TransitionRequest {
        TransitionRequest {
            form_name: FORM.into(),
            target_stage: target.into(),
            applications,
            actor,
        }
    }
}

// ============================================================
// Creation
// ============================================================

#[tokio::test]
async fn creation_starts_in_initial_stage_with_one_timeline_entry() {
    let h = Harness::new().await;

    let app = h.create("Ada").await;

    assert_eq!(app.status, "Submitted");
    assert_eq!(h.status_of(app.uuid).await, "Submitted");

    let timeline = h.orchestrator.timeline(app.uuid).await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].from_status, None);
    assert_eq!(timeline[0].to_status, "Submitted");
    assert_eq!(timeline[0].actions_executed, vec!["email"]);

    let sent = h.mocks.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ada@example.org");
    assert_eq!(sent[0].subject, "Received");
}

#[tokio::test]
async fn initial_action_failures_do_not_block_creation() {
    let mocks = MockCollaborators::default().with_mailer(MockMailer::failing("smtp down"));
    let h = Harness::with(licence_template(), mocks).await;

    let app = h.create("Ada").await;

    assert_eq!(h.status_of(app.uuid).await, "Submitted");
    let timeline = h.orchestrator.timeline(app.uuid).await.unwrap();
    assert_eq!(timeline.len(), 1);
    assert!(timeline[0].actions_executed.is_empty());
}

#[tokio::test]
async fn failed_initial_write_keeps_the_writes_around_it() {
    let mut template = licence_template();
    template.stages[0].actions = vec![
        action(
            "database_update",
            json!({ "table": "intake", "operation": "insert", "data": { "name": "[name]" } }),
        ),
        action(
            "database_update",
            json!({ "table": "archive", "operation": "insert", "data": { "name": "[name]" } }),
        ),
        action(
            "database_update",
            json!({ "table": "audit", "operation": "insert", "data": { "event": "submitted" } }),
        ),
    ];
    let h = Harness::with(template, MockCollaborators::default()).await;
    h.store.make_read_only("archive");

    let app = h.create("Ada").await;

    assert_eq!(h.store.rows("intake").len(), 1);
    assert!(h.store.rows("archive").is_empty());
    assert_eq!(h.store.rows("audit").len(), 1);

    let timeline = h.orchestrator.timeline(app.uuid).await.unwrap();
    assert_eq!(timeline[0].actions_executed, vec!["database_update", "database_update"]);
    assert_eq!(timeline[0].actions_results[1]["table"], "audit");
}

#[tokio::test]
async fn creation_outside_the_window_is_refused() {
    let mut template = licence_template();
    template.closes_at = Some(Utc::now() - Duration::days(1));
    template.opens_at = Some(Utc::now() - Duration::days(30));
    let h = Harness::with(template, MockCollaborators::default()).await;

    let err = h
        .orchestrator
        .create_application(NewApplication {
            form_name: FORM.into(),
            form_data: form_data("Ada"),
            submitted_by: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::TemplateClosed(form) if form == FORM));
}

// ============================================================
// Transitions
// ============================================================

#[tokio::test]
async fn authorized_transition_updates_status_and_appends_entry() {
    let h = Harness::new().await;
    let app = h.create("Ada").await;

    let report = h
        .orchestrator
        .transition(h.request("Approved", vec![app.uuid], h.admin))
        .await
        .unwrap();

    assert_eq!(report.succeeded, vec![app.uuid]);
    assert!(report.failed.is_empty());
    assert_eq!(h.status_of(app.uuid).await, "Approved");

    let timeline = h.orchestrator.timeline(app.uuid).await.unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[1].from_status.as_deref(), Some("Submitted"));
    assert_eq!(timeline[1].to_status, "Approved");
    assert_eq!(timeline[1].actor, Some(h.admin));
    assert_eq!(timeline[1].actions_executed, vec!["email"]);
    assert_eq!(timeline[1].submitted_data, form_data("Ada"));

    let sent = h.mocks.mailer.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].subject, "Approved");

    let stored = h.store.find_application(app.uuid).await.unwrap();
    assert!(stored.is_final());
}

#[tokio::test]
async fn unauthorized_role_fails_the_whole_batch() {
    let h = Harness::new().await;
    let app = h.create("Ada").await;

    let err = h
        .orchestrator
        .transition(h.request("Approved", vec![app.uuid], h.clerk))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Unauthorized { ref role, .. } if role.as_deref() == Some("clerk")
    ));
    assert_eq!(h.status_of(app.uuid).await, "Submitted");
    assert_eq!(h.mocks.mailer.sent().len(), 1, "only the creation mail");
    assert_eq!(h.orchestrator.timeline(app.uuid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_actor_is_unauthorized() {
    let h = Harness::new().await;
    let app = h.create("Ada").await;

    let err = h
        .orchestrator
        .transition(h.request("Rejected", vec![app.uuid], Uuid::new_v4()))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Unauthorized { role: None, .. }));
}

#[tokio::test]
async fn unknown_target_stage_touches_nothing() {
    let h = Harness::new().await;
    let app = h.create("Ada").await;

    let err = h
        .orchestrator
        .transition(h.request("Archived", vec![app.uuid], h.admin))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnknownStage { ref stage, .. } if stage == "Archived"));
    assert_eq!(h.status_of(app.uuid).await, "Submitted");
    assert_eq!(h.orchestrator.timeline(app.uuid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn one_failing_application_does_not_block_its_siblings() {
    let mut template = licence_template();
    template.stages[1].actions = vec![
        action(
            "database_update",
            json!({ "table": "licences", "operation": "insert", "data": { "holder": "[name]" } }),
        ),
        action(
            "api_call",
            json!({ "endpoint": "https://registry.example.org/licences", "method": "POST" }),
        ),
    ];
    let h = Harness::with(template, MockCollaborators::default()).await;

    let ada = h.create("Ada").await;
    let bob = h.create("Bob").await;
    let cy = h.create("Cy").await;

    // Applications are processed in request order.
    for status in [200, 502, 201] {
        h.mocks.http.push_response(Ok(HttpResponse {
            status,
            body: String::new(),
        }));
    }

    let report = h
        .orchestrator
        .transition(h.request("Approved", vec![ada.uuid, bob.uuid, cy.uuid], h.admin))
        .await
        .unwrap();

    assert_eq!(report.succeeded, vec![ada.uuid, cy.uuid]);
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.application, bob.uuid);
    assert_eq!(failure.stage, "Approved");
    assert_eq!(failure.action_index, Some(1));
    assert_eq!(failure.action_type.as_deref(), Some("api_call"));
    assert!(failure.message.contains("502"), "{}", failure.message);

    assert_eq!(h.status_of(ada.uuid).await, "Approved");
    assert_eq!(h.status_of(bob.uuid).await, "Submitted");
    assert_eq!(h.status_of(cy.uuid).await, "Approved");

    // Bob's insert was rolled back with the rest of his transaction.
    let holders: Vec<Value> = h
        .store
        .rows("licences")
        .into_iter()
        .map(|row| row["holder"].clone())
        .collect();
    assert_eq!(holders, vec![json!("Ada"), json!("Cy")]);

    assert_eq!(h.orchestrator.timeline(bob.uuid).await.unwrap().len(), 1);
    assert_eq!(h.orchestrator.timeline(cy.uuid).await.unwrap().len(), 2);
}

#[tokio::test]
async fn zero_successes_is_a_batch_failure() {
    let mut template = licence_template();
    template.stages[2].actions = vec![action(
        "database_update",
        json!({ "table": "archive", "operation": "insert", "data": { "name": "[name]" } }),
    )];
    let h = Harness::with(template, MockCollaborators::default()).await;
    h.store.make_read_only("archive");

    let ada = h.create("Ada").await;
    let missing = Uuid::new_v4();

    let err = h
        .orchestrator
        .transition(h.request("Rejected", vec![ada.uuid, missing], h.clerk))
        .await
        .unwrap_err();

    let EngineError::BatchFailed { stage, failures } = err else {
        panic!("expected BatchFailed");
    };
    assert_eq!(stage, "Rejected");
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].application, ada.uuid);
    assert_eq!(failures[0].action_index, Some(0));
    assert_eq!(failures[1].application, missing);
    assert_eq!(failures[1].action_index, None);
    assert_eq!(h.status_of(ada.uuid).await, "Submitted");
}

#[tokio::test]
async fn application_of_another_form_is_rejected() {
    let h = Harness::new().await;
    let mut other = h.create("Ada").await;
    other.uuid = Uuid::new_v4();
    other.form_name = "other-form".into();
    h.store.seed_application(other.clone());

    let err = h
        .orchestrator
        .transition(h.request("Rejected", vec![other.uuid], h.clerk))
        .await
        .unwrap_err();

    let EngineError::BatchFailed { failures, .. } = err else {
        panic!("expected BatchFailed");
    };
    assert!(failures[0].message.contains("other-form"));
}

#[tokio::test]
async fn unrecognized_actions_are_skipped_during_transition() {
    let h = Harness::new().await;
    let app = h.create("Ada").await;

    // A legacy action slipped into the stored snapshot of the template.
    let mut template = h.store.find_template(FORM).await.unwrap();
    template.stages[2].actions.push(StageAction::Unrecognized(ActionDefinition {
        action_type: "legacy_fax".into(),
        config: Map::new(),
    }));
    h.store.save_template(&template).await.unwrap();

    let report = h
        .orchestrator
        .transition(h.request("Rejected", vec![app.uuid], h.clerk))
        .await
        .unwrap();

    assert_eq!(report.succeeded, vec![app.uuid]);
    let timeline = h.orchestrator.timeline(app.uuid).await.unwrap();
    assert_eq!(timeline[1].actions_executed, vec!["legacy_fax"]);
}

// ============================================================
// Queries and templates
// ============================================================

#[tokio::test]
async fn creation_entry_is_backfilled_once() {
    let h = Harness::new().await;
    let template = h.store.find_template(FORM).await.unwrap();
    let created = Utc::now() - Duration::days(3);
    let legacy = ApplicationInstance {
        uuid: Uuid::new_v4(),
        form_name: FORM.into(),
        status: "Submitted".into(),
        form_data: form_data("Ada"),
        template,
        submitted_by: Some(h.clerk),
        created_at: created,
        updated_at: created,
    };
    h.store.seed_application(legacy.clone());

    let first = h.orchestrator.timeline(legacy.uuid).await.unwrap();
    let second = h.orchestrator.timeline(legacy.uuid).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert!(first[0].is_creation());
    assert_eq!(first[0].created_at, created);
    assert_eq!(first[0].actor, Some(h.clerk));
}

#[tokio::test]
async fn available_transitions_respect_roles() {
    let h = Harness::new().await;
    let app = h.create("Ada").await;

    let for_admin: Vec<String> = h
        .orchestrator
        .available_transitions(app.uuid, h.admin)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    let for_clerk: Vec<String> = h
        .orchestrator
        .available_transitions(app.uuid, h.clerk)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();

    assert_eq!(for_admin, vec!["Approved", "Rejected"]);
    assert_eq!(for_clerk, vec!["Rejected"]);
    assert!(h
        .orchestrator
        .available_transitions(app.uuid, Uuid::new_v4())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn invalid_templates_are_not_saved() {
    let h = Harness::new().await;
    let mut broken = licence_template();
    broken.form_name = "broken".into();
    broken.final_stage = "Closed".into();

    let err = h.orchestrator.save_template(&broken).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::InvalidTemplate(TemplateError::UnknownBoundaryStage { role: "final", .. })
    ));
    assert!(h.store.find_template("broken").await.is_err());
}

#[tokio::test]
async fn test_action_reports_validation_errors() {
    let h = Harness::new().await;

    let ok = h
        .orchestrator
        .test_action("webhook", json!({ "url": "https://a.example", "method": "post" }).as_object().unwrap())
        .unwrap();
    assert_eq!(ok.config["method"], "POST");
    assert_eq!(ok.config["verify_ssl"], true);

    let err = h
        .orchestrator
        .test_action("fax", &Map::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
