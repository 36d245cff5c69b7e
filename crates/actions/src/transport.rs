//! Production implementations of the collaborator traits.
//!
//! - [`ReqwestClient`]: HTTP over `reqwest`, honouring per-request timeouts
//!   and `verify_ssl = false`.
//! - [`LocalFileWriter`]: writes text documents under a root directory.
//! - [`LogMailer`] / [`LogSmsGateway`]: log-only delivery, used until a real
//!   provider is wired in.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::collaborators::{
    CollaboratorError, FileWriter, HttpClient, HttpRequest, HttpResponse, MailSender, SmsGateway,
};
use crate::registry::{FileFormat, HttpMethod, SmsProvider};

const USER_AGENT: &str = concat!("stagehand/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReqwestClient {
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            verified: reqwest::Client::builder().user_agent(USER_AGENT).build()?,
            unverified: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, CollaboratorError> {
        let client = if request.verify_tls {
            &self.verified
        } else {
            &self.unverified
        };

        let mut builder = client
            .request(to_reqwest(request.method), request.url.as_str())
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let timeout = request.timeout;
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                CollaboratorError::Timeout(timeout)
            } else {
                CollaboratorError::Transport(e.to_string())
            }
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(HttpResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Writes generated documents as files under `root`.
///
/// Only text formats (`txt`, `html`) are written; `pdf`/`docx` need a
/// document renderer and are rejected.
#[derive(Debug, Clone)]
pub struct LocalFileWriter {
    root: PathBuf,
}

impl LocalFileWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileWriter for LocalFileWriter {
    async fn write(
        &self,
        filename: &str,
        format: FileFormat,
        contents: &str,
    ) -> Result<String, CollaboratorError> {
        if matches!(format, FileFormat::Pdf | FileFormat::Docx) {
            return Err(CollaboratorError::Rejected(format!(
                "no renderer configured for '{format}' documents"
            )));
        }

        // Never let a rendered filename escape the root directory.
        let name = Path::new(filename)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CollaboratorError::Rejected(format!("unusable filename '{filename}'")))?;
        let path = self.root.join(name);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        info!(path = %path.display(), "generated document written");
        Ok(path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// Log-only delivery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), CollaboratorError> {
        info!(to, subject, bytes = html_body.len(), "mail delivered to log");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSmsGateway;

#[async_trait]
impl SmsGateway for LogSmsGateway {
    async fn send(&self, provider: SmsProvider, to: &str, message: &str) -> Result<(), CollaboratorError> {
        info!(%provider, to, chars = message.chars().count(), "sms delivered to log");
        Ok(())
    }
}
