//! Runs a single stage action against an application's data context.
//!
//! `ActionExecutor` renders every user-facing string through the
//! [`TemplateEngine`] and routes the effect through the matching
//! [`crate::collaborators`] trait. It never retries and never swallows a
//! failure: containment is decided by the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};
use url::Url;

use templating::engine::{lookup, sole_field, value_text};
use templating::TemplateEngine;

use crate::collaborators::{Collaborators, DatabaseHandle, DatabaseMutation, HttpRequest, HttpResponse};
use crate::registry::{
    Action, AdminEmailAction, ApiCallAction, DatabaseUpdateAction, EmailAction, FileGenerationAction,
    HttpMethod, SlackNotificationAction, SmsNotificationAction, StageAction, WebhookAction,
};
use crate::signing;
use crate::ActionError;

/// Timeout for webhook and Slack deliveries, which have no configurable one.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// What a successful action produced; stored in the timeline entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub action_type: String,
    pub output: Value,
}

impl ActionOutcome {
    fn new(action_type: &str, output: Value) -> Self {
        Self {
            action_type: action_type.to_owned(),
            output,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionExecutor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActionExecutor {
    templates: TemplateEngine,
    collaborators: Collaborators,
}

impl ActionExecutor {
    pub fn new(templates: TemplateEngine, collaborators: Collaborators) -> Self {
        Self {
            templates,
            collaborators,
        }
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Execute `action` with `context` as template data.
    ///
    /// `database` is the transaction of the application being processed;
    /// only `database_update` touches it.
    ///
    /// # Errors
    /// Returns [`ActionError`] when the context lacks a required field or a
    /// collaborator fails.
    #[instrument(skip(self, action, context, database), fields(action_type = %action.action_type()))]
    pub async fn execute(
        &self,
        action: &StageAction,
        context: &Map<String, Value>,
        database: &dyn DatabaseHandle,
    ) -> Result<ActionOutcome, ActionError> {
        let action = match action {
            StageAction::Known(action) => action,
            StageAction::Unrecognized(def) => {
                warn!(
                    "no executor for action type '{}', passing context through",
                    def.action_type
                );
                return Ok(ActionOutcome::new(
                    &def.action_type,
                    Value::Object(context.clone()),
                ));
            }
        };

        let kind = action.kind().as_str();
        let output = match action {
            Action::Email(a) => self.email(a, context).await?,
            Action::AdminEmail(a) => self.admin_email(a, context).await?,
            Action::ApiCall(a) => self.api_call(a, context).await?,
            Action::DatabaseUpdate(a) => self.database_update(a, context, database).await?,
            Action::Webhook(a) => self.webhook(a, context).await?,
            Action::FileGeneration(a) => self.file_generation(a, context).await?,
            Action::SmsNotification(a) => self.sms(a, context).await?,
            Action::SlackNotification(a) => self.slack(a, context).await?,
        };

        info!("action '{}' completed", kind);
        Ok(ActionOutcome::new(kind, output))
    }

    // -----------------------------------------------------------------------
    // Per-variant handlers
    // -----------------------------------------------------------------------

    async fn email(&self, a: &EmailAction, context: &Map<String, Value>) -> Result<Value, ActionError> {
        let to = context_text(context, "email")?;
        self.send_mail(&to, &a.subject, &a.template, context).await
    }

    async fn admin_email(
        &self,
        a: &AdminEmailAction,
        context: &Map<String, Value>,
    ) -> Result<Value, ActionError> {
        self.send_mail(&a.admin_email, &a.subject, &a.template, context)
            .await
    }

    async fn send_mail(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &Map<String, Value>,
    ) -> Result<Value, ActionError> {
        let subject = self.templates.process(subject, context);
        let body = self.templates.process(template, context);

        self.collaborators
            .mailer
            .send(to, &subject, &body)
            .await
            .map_err(ActionError::collaborator("mailer"))?;

        Ok(json!({ "to": to, "subject": subject }))
    }

    async fn api_call(&self, a: &ApiCallAction, context: &Map<String, Value>) -> Result<Value, ActionError> {
        let endpoint = self.templates.process(&a.endpoint, context);
        let mut url = Url::parse(&endpoint).map_err(|e| ActionError::InvalidUrl {
            url: endpoint.clone(),
            message: e.to_string(),
        })?;

        if !a.query_params.is_empty() {
            let resolved = resolve_mapping(&a.query_params, context);
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &resolved {
                pairs.append_pair(key, &value_text(value));
            }
        }

        let mut headers = a.headers.clone();
        headers.insert("Accept".into(), "application/json".into());
        if let Some(token) = &a.auth_token {
            headers.insert("Authorization".into(), format!("Bearer {token}"));
        }

        let body = if a.method == HttpMethod::Get || a.body_mapping.is_empty() {
            None
        } else {
            headers.insert("Content-Type".into(), "application/json".into());
            Some(Value::Object(resolve_mapping(&a.body_mapping, context)).to_string())
        };

        let request = HttpRequest {
            method: a.method,
            url: url.to_string(),
            headers,
            body,
            timeout: Duration::from_secs(a.timeout),
            verify_tls: true,
        };
        let response = self.send_http(request).await?;

        let parsed = serde_json::from_str::<Value>(&response.body)
            .unwrap_or_else(|_| Value::String(response.body.clone()));
        Ok(json!({ "status": response.status, "response": parsed }))
    }

    async fn database_update(
        &self,
        a: &DatabaseUpdateAction,
        context: &Map<String, Value>,
        database: &dyn DatabaseHandle,
    ) -> Result<Value, ActionError> {
        let mutation = DatabaseMutation {
            table: a.table.clone(),
            operation: a.operation,
            data: self.bind_values(a.data.as_ref(), context),
            conditions: self.bind_values(a.conditions.as_ref(), context),
        };

        let rows = database
            .apply(&mutation)
            .await
            .map_err(ActionError::collaborator("database"))?;

        Ok(json!({
            "table": mutation.table,
            "operation": mutation.operation.as_str(),
            "rows_affected": rows,
        }))
    }

    async fn webhook(&self, a: &WebhookAction, context: &Map<String, Value>) -> Result<Value, ActionError> {
        let body = Value::Object(context.clone()).to_string();

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_owned(), "application/json".to_owned());
        if let Some(secret) = &a.secret {
            let timestamp = Utc::now().timestamp().to_string();
            headers.insert(
                signing::SIGNATURE_HEADER.to_owned(),
                signing::signature_header(secret, &timestamp, body.as_bytes()),
            );
            headers.insert(signing::TIMESTAMP_HEADER.to_owned(), timestamp);
        }

        let request = HttpRequest {
            method: a.method.into(),
            url: a.url.clone(),
            headers,
            body: Some(body),
            timeout: DELIVERY_TIMEOUT,
            verify_tls: a.verify_ssl,
        };
        let response = self.send_http(request).await?;

        Ok(json!({ "status": response.status, "signed": a.secret.is_some() }))
    }

    async fn file_generation(
        &self,
        a: &FileGenerationAction,
        context: &Map<String, Value>,
    ) -> Result<Value, ActionError> {
        let contents = self.templates.process(&a.template, context);
        let mut filename = self.templates.process(&a.filename, context);
        let suffix = format!(".{}", a.format.extension());
        if !filename.to_ascii_lowercase().ends_with(&suffix) {
            filename.push_str(&suffix);
        }

        let location = self
            .collaborators
            .files
            .write(&filename, a.format, &contents)
            .await
            .map_err(ActionError::collaborator("file writer"))?;

        Ok(json!({ "filename": filename, "location": location }))
    }

    async fn sms(&self, a: &SmsNotificationAction, context: &Map<String, Value>) -> Result<Value, ActionError> {
        let phone = context_text(context, &a.phone_field)?;
        let message = self.templates.process(&a.message, context);

        self.collaborators
            .sms
            .send(a.provider, &phone, &message)
            .await
            .map_err(ActionError::collaborator("sms gateway"))?;

        Ok(json!({ "provider": a.provider.as_str(), "to": phone }))
    }

    async fn slack(
        &self,
        a: &SlackNotificationAction,
        context: &Map<String, Value>,
    ) -> Result<Value, ActionError> {
        let mut payload = Map::new();
        payload.insert(
            "text".into(),
            Value::String(self.templates.process(&a.message, context)),
        );
        if let Some(channel) = &a.channel {
            payload.insert("channel".into(), Value::String(channel.clone()));
        }

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_owned(), "application/json".to_owned());

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: a.webhook_url.clone(),
            headers,
            body: Some(Value::Object(payload).to_string()),
            timeout: DELIVERY_TIMEOUT,
            verify_tls: true,
        };
        let response = self.send_http(request).await?;

        Ok(json!({ "status": response.status }))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn send_http(&self, request: HttpRequest) -> Result<HttpResponse, ActionError> {
        let method = request.method.as_str().to_owned();
        let url = request.url.clone();

        let response = self
            .collaborators
            .http
            .request(request)
            .await
            .map_err(ActionError::collaborator("http client"))?;

        if !response.is_success() {
            return Err(ActionError::UnexpectedStatus {
                method,
                url,
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Column values for a mutation. A string that is exactly one `[field]`
    /// token binds the raw context value so dates and numbers keep their type;
    /// any other string is rendered as text.
    fn bind_values(&self, map: Option<&Map<String, Value>>, context: &Map<String, Value>) -> Map<String, Value> {
        map.into_iter()
            .flatten()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => match sole_field(s).and_then(|field| lookup(context, field)) {
                        Some(raw) => raw.clone(),
                        None => Value::String(self.templates.process(s, context)),
                    },
                    other => other.clone(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }
}

/// A mapping value naming an existing context key is replaced by that key's
/// value; anything else is sent literally.
fn resolve_mapping(mapping: &Map<String, Value>, context: &Map<String, Value>) -> Map<String, Value> {
    mapping
        .iter()
        .map(|(target, source)| {
            let value = match source {
                Value::String(key) => context.get(key).cloned().unwrap_or_else(|| source.clone()),
                other => other.clone(),
            };
            (target.clone(), value)
        })
        .collect()
}

fn context_text(context: &Map<String, Value>, field: &str) -> Result<String, ActionError> {
    context
        .get(field)
        .map(value_text)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::MissingContextField(field.to_owned()))
}
