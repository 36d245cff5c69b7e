//! The closed set of stage action types and the factory that builds them.
//!
//! Wire format (persisted per stage):
//!
//! ```json
//! { "type": "webhook", "config": { "url": "https://...", "method": "POST" } }
//! ```
//!
//! [`Action::from_config`] validates the config exhaustively; an [`Action`]
//! value therefore always holds a well-formed configuration and can be
//! executed without further checks.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ConfigEnum, ConfigReader};
use crate::ValidationError;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Discriminator of the action union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Email,
    AdminEmail,
    ApiCall,
    DatabaseUpdate,
    Webhook,
    FileGeneration,
    SmsNotification,
    SlackNotification,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        Self::Email,
        Self::AdminEmail,
        Self::ApiCall,
        Self::DatabaseUpdate,
        Self::Webhook,
        Self::FileGeneration,
        Self::SmsNotification,
        Self::SlackNotification,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::AdminEmail => "admin_email",
            Self::ApiCall => "api_call",
            Self::DatabaseUpdate => "database_update",
            Self::Webhook => "webhook",
            Self::FileGeneration => "file_generation",
            Self::SmsNotification => "sms_notification",
            Self::SlackNotification => "slack_notification",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownActionType(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Config enums
// ---------------------------------------------------------------------------

macro_rules! config_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(if s.eq_ignore_ascii_case($text) { return Ok(Self::$variant); })+
                Err(())
            }
        }

        impl ConfigEnum for $name {
            const ALLOWED: &'static [&'static str] = &[$($text),+];
        }
    };
}

config_enum!(
    /// HTTP verbs accepted by `api_call`.
    HttpMethod { Get => "GET", Post => "POST", Put => "PUT", Delete => "DELETE", Patch => "PATCH" }
);

config_enum!(
    /// HTTP verbs accepted by `webhook`.
    WebhookMethod { Post => "POST", Put => "PUT", Patch => "PATCH" }
);

config_enum!(
    DbOperation { Insert => "insert", Update => "update", Delete => "delete" }
);

config_enum!(
    /// Output formats for `file_generation`.
    FileFormat { Pdf => "pdf", Docx => "docx", Txt => "txt", Html => "html" }
);

config_enum!(
    SmsProvider { Twilio => "twilio", AwsSns => "aws_sns", Nexmo => "nexmo" }
);

impl From<WebhookMethod> for HttpMethod {
    fn from(method: WebhookMethod) -> Self {
        match method {
            WebhookMethod::Post => Self::Post,
            WebhookMethod::Put => Self::Put,
            WebhookMethod::Patch => Self::Patch,
        }
    }
}

impl FileFormat {
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Send a rendered e-mail to the applicant (`context.email`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailAction {
    pub template: String,
    pub subject: String,
}

/// Send a rendered e-mail to a fixed administrator address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminEmailAction {
    pub template: String,
    pub subject: String,
    pub admin_email: String,
}

/// Call an external HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiCallAction {
    pub endpoint: String,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body field -> context key (or literal value).
    pub body_mapping: Map<String, Value>,
    /// Query parameter -> context key (or literal value).
    pub query_params: Map<String, Value>,
    /// Seconds.
    pub timeout: u64,
    /// Advisory only: the engine never retries.
    pub retry_attempts: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseUpdateAction {
    pub table: String,
    pub operation: DbOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Map<String, Value>>,
}

/// POST the whole data context to a URL, optionally HMAC-signed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAction {
    pub url: String,
    pub method: WebhookMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileGenerationAction {
    pub template: String,
    pub filename: String,
    pub format: FileFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmsNotificationAction {
    pub message: String,
    /// Context key holding the recipient's phone number.
    pub phone_field: String,
    pub provider: SmsProvider,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackNotificationAction {
    pub webhook_url: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// A validated, executable stage action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Email(EmailAction),
    AdminEmail(AdminEmailAction),
    ApiCall(ApiCallAction),
    DatabaseUpdate(DatabaseUpdateAction),
    Webhook(WebhookAction),
    FileGeneration(FileGenerationAction),
    SmsNotification(SmsNotificationAction),
    SlackNotification(SlackNotificationAction),
}

impl Action {
    /// Build an action from its `type` and raw `config`.
    ///
    /// # Errors
    /// [`ValidationError::UnknownActionType`] for an unknown `type`, or the
    /// first field-level violation found in `config`.
    pub fn from_config(action_type: &str, config: &Map<String, Value>) -> Result<Self, ValidationError> {
        Self::build(action_type.parse()?, config)
    }

    /// Build an action of a known kind.
    pub fn build(kind: ActionKind, config: &Map<String, Value>) -> Result<Self, ValidationError> {
        let r = ConfigReader::new(kind, config);

        let action = match kind {
            ActionKind::Email => Self::Email(EmailAction {
                template: r.required_str("template")?,
                subject: r.required_str("subject")?,
            }),

            ActionKind::AdminEmail => Self::AdminEmail(AdminEmailAction {
                template: r.required_str("template")?,
                subject: r.required_str("subject")?,
                admin_email: r.required_email("admin_email")?,
            }),

            ActionKind::ApiCall => Self::ApiCall(ApiCallAction {
                endpoint: r.required_url("endpoint")?,
                method: r.required_enum("method")?,
                auth_token: r.optional_str("auth_token")?,
                headers: r.string_map("headers")?,
                body_mapping: r.optional_object("body_mapping")?.unwrap_or_default(),
                query_params: r.optional_object("query_params")?.unwrap_or_default(),
                timeout: r.int_in_range("timeout", 1, 300, 30)? as u64,
                retry_attempts: r.int_in_range("retry_attempts", 0, 5, 0)? as u8,
            }),

            ActionKind::DatabaseUpdate => {
                let table = r.required_identifier("table")?;
                let operation: DbOperation = r.required_enum("operation")?;
                let data = r.optional_object("data")?;
                let conditions = r.optional_object("conditions")?;

                if operation != DbOperation::Delete && data.as_ref().map_or(true, Map::is_empty) {
                    return Err(r.missing("data"));
                }
                if operation != DbOperation::Insert
                    && conditions.as_ref().map_or(true, Map::is_empty)
                {
                    return Err(r.missing("conditions"));
                }

                Self::DatabaseUpdate(DatabaseUpdateAction {
                    table,
                    operation,
                    data,
                    conditions,
                })
            }

            ActionKind::Webhook => Self::Webhook(WebhookAction {
                url: r.required_url("url")?,
                method: r.required_enum("method")?,
                secret: r.optional_str("secret")?,
                verify_ssl: r.bool_or("verify_ssl", true)?,
            }),

            ActionKind::FileGeneration => Self::FileGeneration(FileGenerationAction {
                template: r.required_str("template")?,
                filename: r.required_str("filename")?,
                format: r.required_enum("format")?,
            }),

            ActionKind::SmsNotification => Self::SmsNotification(SmsNotificationAction {
                message: r.required_str("message")?,
                phone_field: r.required_str("phone_field")?,
                provider: r.required_enum("provider")?,
            }),

            ActionKind::SlackNotification => Self::SlackNotification(SlackNotificationAction {
                webhook_url: r.required_url("webhook_url")?,
                message: r.required_str("message")?,
                channel: r.optional_str("channel")?,
            }),
        };

        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Email(_) => ActionKind::Email,
            Self::AdminEmail(_) => ActionKind::AdminEmail,
            Self::ApiCall(_) => ActionKind::ApiCall,
            Self::DatabaseUpdate(_) => ActionKind::DatabaseUpdate,
            Self::Webhook(_) => ActionKind::Webhook,
            Self::FileGeneration(_) => ActionKind::FileGeneration,
            Self::SmsNotification(_) => ActionKind::SmsNotification,
            Self::SlackNotification(_) => ActionKind::SlackNotification,
        }
    }

    /// The normalized wire form (defaults filled in).
    pub fn to_definition(&self) -> ActionDefinition {
        let config = match self {
            Self::Email(a) => config_map(a),
            Self::AdminEmail(a) => config_map(a),
            Self::ApiCall(a) => config_map(a),
            Self::DatabaseUpdate(a) => config_map(a),
            Self::Webhook(a) => config_map(a),
            Self::FileGeneration(a) => config_map(a),
            Self::SmsNotification(a) => config_map(a),
            Self::SlackNotification(a) => config_map(a),
        };

        ActionDefinition {
            action_type: self.kind().as_str().to_owned(),
            config,
        }
    }
}

fn config_map<T: Serialize>(variant: &T) -> Map<String, Value> {
    match serde_json::to_value(variant) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

impl TryFrom<ActionDefinition> for Action {
    type Error = ValidationError;

    fn try_from(def: ActionDefinition) -> Result<Self, Self::Error> {
        Self::from_config(&def.action_type, &def.config)
    }
}

impl From<&Action> for ActionDefinition {
    fn from(action: &Action) -> Self {
        action.to_definition()
    }
}

/// Validate a config without executing anything, returning its normalized
/// form. Used by template authors to dry-run an action.
pub fn test_action(action_type: &str, config: &Map<String, Value>) -> Result<ActionDefinition, ValidationError> {
    Action::from_config(action_type, config).map(|action| action.to_definition())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Raw `{ "type", "config" }` pair as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// An action as stored on a stage.
///
/// Known types are validated strictly on load. A `type` outside the closed
/// set is kept as [`StageAction::Unrecognized`] so legacy stages still load;
/// template validation rejects it and the executor treats it as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ActionDefinition", into = "ActionDefinition")]
pub enum StageAction {
    Known(Action),
    Unrecognized(ActionDefinition),
}

impl StageAction {
    pub fn action_type(&self) -> &str {
        match self {
            Self::Known(action) => action.kind().as_str(),
            Self::Unrecognized(def) => &def.action_type,
        }
    }

    pub fn definition(&self) -> ActionDefinition {
        match self {
            Self::Known(action) => action.to_definition(),
            Self::Unrecognized(def) => def.clone(),
        }
    }
}

impl From<Action> for StageAction {
    fn from(action: Action) -> Self {
        Self::Known(action)
    }
}

impl TryFrom<ActionDefinition> for StageAction {
    type Error = ValidationError;

    fn try_from(def: ActionDefinition) -> Result<Self, Self::Error> {
        match def.action_type.parse::<ActionKind>() {
            Ok(kind) => Action::build(kind, &def.config).map(Self::Known),
            Err(_) => Ok(Self::Unrecognized(def)),
        }
    }
}

impl From<StageAction> for ActionDefinition {
    fn from(action: StageAction) -> Self {
        match action {
            StageAction::Known(action) => action.to_definition(),
            StageAction::Unrecognized(def) => def,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
