//! Stage transition orchestrator.
//!
//! `StageOrchestrator` is the state machine over a template's stages:
//! 1. Resolves the target stage and checks the actor's role against it.
//! 2. Runs the stage's actions for each application in its own store
//!    transaction, in declared order, stopping at the first failure.
//! 3. Bulk-updates `status` for the applications whose actions all
//!    succeeded and appends one timeline entry for each.
//!
//! A failing application never blocks its siblings; a batch with zero
//! successes is reported as [`EngineError::BatchFailed`].

use std::fmt;
use std::sync::Arc;

use actions::{ActionDefinition, ActionExecutor, ActionOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{ApplicationInstance, ApplicationTemplate, NewApplication, Stage, TimelineEntry};
use crate::store::{RoleProvider, StoreTransaction, WorkflowStore};
use crate::validation::validate_template;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Requests and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub form_name: String,
    pub target_stage: String,
    pub applications: Vec<Uuid>,
    pub actor: Uuid,
}

/// Why one application of a batch was not transitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionFailure {
    pub application: Uuid,
    pub stage: String,
    /// Index of the failing action; `None` when the failure happened outside
    /// action execution (loading, transaction handling).
    pub action_index: Option<usize>,
    pub action_type: Option<String>,
    pub message: String,
}

impl fmt::Display for TransitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.action_index, &self.action_type) {
            (Some(index), Some(kind)) => write!(
                f,
                "application {} -> '{}': action #{} ({}) failed: {}",
                self.application, self.stage, index, kind, self.message
            ),
            _ => write!(
                f,
                "application {} -> '{}': {}",
                self.application, self.stage, self.message
            ),
        }
    }
}

/// Outcome of a batch that moved at least one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionReport {
    pub stage: String,
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<TransitionFailure>,
}

/// A stage the actor could move an application to next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStage {
    pub name: String,
    pub description: String,
}

// Per-application result of running a stage's actions.
struct Applied {
    application: ApplicationInstance,
    outcomes: Vec<ActionOutcome>,
}

// ---------------------------------------------------------------------------
// StageOrchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StageOrchestrator {
    store: Arc<dyn WorkflowStore>,
    roles: Arc<dyn RoleProvider>,
    executor: ActionExecutor,
}

impl fmt::Debug for StageOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageOrchestrator")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl StageOrchestrator {
    pub fn new(store: Arc<dyn WorkflowStore>, roles: Arc<dyn RoleProvider>, executor: ActionExecutor) -> Self {
        Self {
            store,
            roles,
            executor,
        }
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Validate and persist a template.
    #[instrument(skip(self, template), fields(form_name = %template.form_name))]
    pub async fn save_template(&self, template: &ApplicationTemplate) -> Result<(), EngineError> {
        validate_template(template)?;
        self.store.save_template(template).await?;
        info!("template saved with {} stages", template.stages.len());
        Ok(())
    }

    pub async fn template(&self, form_name: &str) -> Result<ApplicationTemplate, EngineError> {
        Ok(self.store.find_template(form_name).await?)
    }

    /// Dry-run validation of one action config.
    pub fn test_action(&self, action_type: &str, config: &Map<String, Value>) -> Result<ActionDefinition, EngineError> {
        Ok(actions::test_action(action_type, config)?)
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create an instance in the template's initial stage.
    ///
    /// The initial stage's actions run best-effort: a failing action is
    /// logged and rolled back, never fatal.
    ///
    /// # Errors
    /// [`EngineError::TemplateClosed`] outside the availability window;
    /// [`EngineError::InvalidTemplate`] if the stored template is broken.
    #[instrument(skip(self, request), fields(form_name = %request.form_name))]
    pub async fn create_application(&self, request: NewApplication) -> Result<ApplicationInstance, EngineError> {
        let template = self.store.find_template(&request.form_name).await?;
        validate_template(&template)?;

        let now = Utc::now();
        if !template.is_open_at(now) {
            return Err(EngineError::TemplateClosed(template.form_name));
        }

        let application = ApplicationInstance {
            uuid: Uuid::new_v4(),
            form_name: template.form_name.clone(),
            status: template.initial_stage.clone(),
            form_data: request.form_data,
            template,
            submitted_by: request.submitted_by,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_application(&application).await?;

        let mut entry = TimelineEntry::creation(&application);
        if let Some(stage) = application.current_stage() {
            let outcomes = self.run_best_effort(stage, &application).await;
            for outcome in outcomes {
                entry.actions_executed.push(outcome.action_type);
                entry.actions_results.push(outcome.output);
            }
        }
        self.store.append_timeline_entry(&entry).await?;

        info!(application = %application.uuid, "application created in '{}'", application.status);
        Ok(application)
    }

    /// Each action gets its own transaction, so a failed statement cannot
    /// poison the writes of the actions around it.
    async fn run_best_effort(&self, stage: &Stage, application: &ApplicationInstance) -> Vec<ActionOutcome> {
        let context = application.context();
        let mut outcomes = Vec::with_capacity(stage.actions.len());

        for (index, action) in stage.actions.iter().enumerate() {
            let tx = match self.store.begin().await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(application = %application.uuid, "initial action #{index}: cannot open transaction: {e}");
                    continue;
                }
            };

            match self.executor.execute(action, &context, tx.database()).await {
                Ok(outcome) => match tx.commit().await {
                    Ok(()) => outcomes.push(outcome),
                    Err(e) => warn!(
                        application = %application.uuid,
                        "initial action #{} ({}) could not commit: {}",
                        index,
                        action.action_type(),
                        e
                    ),
                },
                Err(e) => {
                    warn!(
                        application = %application.uuid,
                        "initial action #{} ({}) failed, skipping: {}",
                        index,
                        action.action_type(),
                        e
                    );
                    rollback(tx, application.uuid).await;
                }
            }
        }

        outcomes
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Move a batch of applications into `request.target_stage`.
    ///
    /// # Errors
    /// - [`EngineError::UnknownStage`] / [`EngineError::Unauthorized`] before
    ///   any application is touched.
    /// - [`EngineError::BatchFailed`] if no application succeeded.
    #[instrument(
        skip(self, request),
        fields(form_name = %request.form_name, stage = %request.target_stage, batch = request.applications.len())
    )]
    pub async fn transition(&self, request: TransitionRequest) -> Result<TransitionReport, EngineError> {
        // ------------------------------------------------------------------
        // Resolve the target stage and authorize the actor.
        // ------------------------------------------------------------------
        let template = self.store.find_template(&request.form_name).await?;
        let stage = template
            .stage(&request.target_stage)
            .ok_or_else(|| EngineError::UnknownStage {
                form_name: request.form_name.clone(),
                stage: request.target_stage.clone(),
            })?;

        let role = self.roles.role_of(request.actor).await?;
        if !role.as_deref().is_some_and(|r| stage.allows_role(r)) {
            warn!(actor = %request.actor, ?role, "transition refused");
            return Err(EngineError::Unauthorized {
                actor: request.actor,
                role,
                stage: stage.name.clone(),
            });
        }

        // ------------------------------------------------------------------
        // Run the stage's actions per application.
        // ------------------------------------------------------------------
        let mut applied: Vec<Applied> = Vec::new();
        let mut failed: Vec<TransitionFailure> = Vec::new();

        for &uuid in &request.applications {
            match self.apply_stage(&request.form_name, stage, uuid).await {
                Ok(done) => applied.push(done),
                Err(failure) => {
                    error!("{}", failure);
                    failed.push(failure);
                }
            }
        }

        if applied.is_empty() {
            return Err(EngineError::BatchFailed {
                stage: stage.name.clone(),
                failures: failed,
            });
        }

        // ------------------------------------------------------------------
        // Persist the new status and audit trail for the successes.
        // ------------------------------------------------------------------
        let succeeded: Vec<Uuid> = applied.iter().map(|a| a.application.uuid).collect();
        self.store.update_status(&succeeded, &stage.name).await?;

        for done in applied {
            let (actions_executed, actions_results): (Vec<String>, Vec<Value>) = done
                .outcomes
                .into_iter()
                .map(|o| (o.action_type, o.output))
                .unzip();

            let entry = TimelineEntry {
                uuid: Uuid::new_v4(),
                application_uuid: done.application.uuid,
                from_status: Some(done.application.status),
                to_status: stage.name.clone(),
                actor: Some(request.actor),
                actions_executed,
                actions_results,
                submitted_data: done.application.form_data,
                created_at: Utc::now(),
            };
            self.store.append_timeline_entry(&entry).await?;
        }

        info!(
            "moved {} application(s) to '{}', {} failed",
            succeeded.len(),
            stage.name,
            failed.len()
        );

        Ok(TransitionReport {
            stage: stage.name.clone(),
            succeeded,
            failed,
        })
    }

    async fn apply_stage(&self, form_name: &str, stage: &Stage, uuid: Uuid) -> Result<Applied, TransitionFailure> {
        let fail = |action_index: Option<usize>, action_type: Option<String>, message: String| TransitionFailure {
            application: uuid,
            stage: stage.name.clone(),
            action_index,
            action_type,
            message,
        };

        let application = self
            .store
            .find_application(uuid)
            .await
            .map_err(|e| fail(None, None, e.to_string()))?;
        if application.form_name != form_name {
            return Err(fail(
                None,
                None,
                format!("application belongs to form '{}'", application.form_name),
            ));
        }

        let context = application.context();
        let tx = self
            .store
            .begin()
            .await
            .map_err(|e| fail(None, None, e.to_string()))?;

        let mut outcomes = Vec::with_capacity(stage.actions.len());
        for (index, action) in stage.actions.iter().enumerate() {
            match self.executor.execute(action, &context, tx.database()).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    rollback(tx, uuid).await;
                    return Err(fail(
                        Some(index),
                        Some(action.action_type().to_owned()),
                        e.to_string(),
                    ));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| fail(None, None, format!("commit failed: {e}")))?;

        Ok(Applied {
            application,
            outcomes,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The application's timeline, oldest first.
    ///
    /// Instances created before creation entries were recorded get one
    /// backfilled here, exactly once.
    #[instrument(skip(self))]
    pub async fn timeline(&self, uuid: Uuid) -> Result<Vec<TimelineEntry>, EngineError> {
        let mut entries = self.store.timeline(uuid).await?;
        if entries.iter().any(TimelineEntry::is_creation) {
            return Ok(entries);
        }

        let application = self.store.find_application(uuid).await?;
        let creation = TimelineEntry::creation(&application);
        self.store.append_timeline_entry(&creation).await?;
        info!("backfilled creation entry");

        entries.insert(0, creation);
        Ok(entries)
    }

    /// Stages reachable from the application's current stage that `actor`
    /// is allowed to move it to.
    #[instrument(skip(self))]
    pub async fn available_transitions(&self, uuid: Uuid, actor: Uuid) -> Result<Vec<CandidateStage>, EngineError> {
        let application = self.store.find_application(uuid).await?;
        let Some(role) = self.roles.role_of(actor).await? else {
            return Ok(Vec::new());
        };
        let Some(current) = application.current_stage() else {
            warn!("status '{}' is not a stage of the snapshot", application.status);
            return Ok(Vec::new());
        };

        let candidates = current
            .allowed_transitions
            .iter()
            .filter_map(|name| application.template.stage(name))
            .filter(|stage| stage.allows_role(&role))
            .map(|stage| CandidateStage {
                name: stage.name.clone(),
                description: stage.description.clone(),
            })
            .collect();

        Ok(candidates)
    }
}

async fn rollback(tx: Box<dyn StoreTransaction>, uuid: Uuid) {
    if let Err(e) = tx.rollback().await {
        error!(application = %uuid, "rollback failed: {}", e);
    }
}
