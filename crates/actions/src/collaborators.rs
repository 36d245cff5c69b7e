//! Side-effect seams used by [`crate::ActionExecutor`].
//!
//! Every external effect an action can have goes through one of these traits,
//! so the executor itself stays free of transport details and is fully
//! testable with [`crate::mock`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::registry::{DbOperation, FileFormat, HttpMethod, SmsProvider};

/// Failure reported by a collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Connection, DNS, TLS or I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator was reached but refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A rendered `database_update`, ready to run inside the current transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseMutation {
    pub table: String,
    pub operation: DbOperation,
    pub data: Map<String, Value>,
    pub conditions: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, CollaboratorError>;
}

/// The per-application transaction a `database_update` writes through.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Returns the number of rows affected.
    async fn apply(&self, mutation: &DatabaseMutation) -> Result<u64, CollaboratorError>;
}

#[async_trait]
pub trait FileWriter: Send + Sync {
    /// Store `contents` and return where it ended up.
    async fn write(
        &self,
        filename: &str,
        format: FileFormat,
        contents: &str,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, provider: SmsProvider, to: &str, message: &str) -> Result<(), CollaboratorError>;
}

/// The set of collaborators an executor dispatches through.
#[derive(Clone)]
pub struct Collaborators {
    pub mailer: Arc<dyn MailSender>,
    pub http: Arc<dyn HttpClient>,
    pub files: Arc<dyn FileWriter>,
    pub sms: Arc<dyn SmsGateway>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
