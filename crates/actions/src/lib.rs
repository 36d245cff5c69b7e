//! `actions` crate — the stage action registry and the executor that runs
//! actions against an application's data context.
//!
//! A stage action is persisted as `{ "type": "...", "config": { ... } }`.
//! [`Action::from_config`] turns that pair into a validated [`Action`];
//! [`ActionExecutor::execute`] performs it through the collaborator traits in
//! [`collaborators`].

mod config;
pub mod collaborators;
pub mod error;
pub mod executor;
pub mod mock;
pub mod registry;
pub mod signing;
pub mod transport;


pub use collaborators::{
    CollaboratorError, Collaborators, DatabaseHandle, DatabaseMutation, FileWriter, HttpClient,
    HttpRequest, HttpResponse, MailSender, SmsGateway,
};
pub use config::ConfigEnum;
pub use error::{ActionError, ValidationError};
pub use executor::{ActionExecutor, ActionOutcome};
pub use registry::{
    test_action, Action, ActionDefinition, ActionKind, DbOperation, FileFormat, HttpMethod,
    SmsProvider, StageAction, WebhookMethod,
};
