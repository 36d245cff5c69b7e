//! Recording test doubles for every collaborator trait.
//!
//! Each mock records the calls it receives and either succeeds or fails with
//! a programmer-specified error. Used by this crate's tests and by the
//! engine's orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::collaborators::{
    CollaboratorError, Collaborators, DatabaseHandle, DatabaseMutation, FileWriter, HttpClient,
    HttpRequest, HttpResponse, MailSender, SmsGateway,
};
use crate::registry::{FileFormat, SmsProvider};

/// A mail captured by [`MockMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<SentMail>>,
    pub failure: Option<CollaboratorError>,
}

impl MockMailer {
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            failure: Some(CollaboratorError::Rejected(msg.into())),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for MockMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: html_body.to_owned(),
        });
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Answers from a queue of scripted responses, then with `status` and `{}`.
#[derive(Debug)]
pub struct MockHttpClient {
    pub requests: Mutex<Vec<HttpRequest>>,
    pub responses: Mutex<VecDeque<Result<HttpResponse, CollaboratorError>>>,
    pub status: u16,
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::with_status(200)
    }
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unscripted requests answer with `status`.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            status,
        }
    }

    pub fn push_response(&self, response: Result<HttpResponse, CollaboratorError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, CollaboratorError> {
        self.requests.lock().unwrap().push(request);
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(HttpResponse {
                status: self.status,
                body: "{}".into(),
            })
        })
    }
}

#[derive(Debug, Default)]
pub struct MockFileWriter {
    pub files: Mutex<Vec<(String, FileFormat, String)>>,
}

impl MockFileWriter {
    pub fn files(&self) -> Vec<(String, FileFormat, String)> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileWriter for MockFileWriter {
    async fn write(
        &self,
        filename: &str,
        format: FileFormat,
        contents: &str,
    ) -> Result<String, CollaboratorError> {
        self.files
            .lock()
            .unwrap()
            .push((filename.to_owned(), format, contents.to_owned()));
        Ok(format!("memory://{filename}"))
    }
}

#[derive(Debug, Default)]
pub struct MockSmsGateway {
    pub sent: Mutex<Vec<(SmsProvider, String, String)>>,
}

impl MockSmsGateway {
    pub fn sent(&self) -> Vec<(SmsProvider, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsGateway for MockSmsGateway {
    async fn send(&self, provider: SmsProvider, to: &str, message: &str) -> Result<(), CollaboratorError> {
        self.sent
            .lock()
            .unwrap()
            .push((provider, to.to_owned(), message.to_owned()));
        Ok(())
    }
}

/// Records mutations; optionally rejects writes to one table.
#[derive(Debug, Default)]
pub struct MockDatabase {
    pub mutations: Mutex<Vec<DatabaseMutation>>,
    pub failing_table: Option<String>,
}

impl MockDatabase {
    pub fn failing_on(table: impl Into<String>) -> Self {
        Self {
            failing_table: Some(table.into()),
            ..Self::default()
        }
    }

    pub fn mutations(&self) -> Vec<DatabaseMutation> {
        self.mutations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseHandle for MockDatabase {
    async fn apply(&self, mutation: &DatabaseMutation) -> Result<u64, CollaboratorError> {
        if self.failing_table.as_deref() == Some(mutation.table.as_str()) {
            return Err(CollaboratorError::Rejected(format!(
                "relation \"{}\" is read-only",
                mutation.table
            )));
        }
        self.mutations.lock().unwrap().push(mutation.clone());
        Ok(1)
    }
}

/// One of each mock, shared so tests can inspect them after execution.
#[derive(Debug, Clone)]
pub struct MockCollaborators {
    pub mailer: Arc<MockMailer>,
    pub http: Arc<MockHttpClient>,
    pub files: Arc<MockFileWriter>,
    pub sms: Arc<MockSmsGateway>,
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self {
            mailer: Arc::new(MockMailer::default()),
            http: Arc::new(MockHttpClient::new()),
            files: Arc::new(MockFileWriter::default()),
            sms: Arc::new(MockSmsGateway::default()),
        }
    }
}

impl MockCollaborators {
    pub fn with_mailer(mut self, mailer: MockMailer) -> Self {
        self.mailer = Arc::new(mailer);
        self
    }

    pub fn with_http(mut self, http: MockHttpClient) -> Self {
        self.http = Arc::new(http);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            mailer: self.mailer.clone(),
            http: self.http.clone(),
            files: self.files.clone(),
            sms: self.sms.clone(),
        }
    }
}
