//! `api` crate — HTTP surface of the workflow engine.
//!
//! Exposes:
//!   PUT    /api/v1/templates
//!   GET    /api/v1/templates/:form_name
//!   POST   /api/v1/applications
//!   GET    /api/v1/applications/:uuid/timeline
//!   GET    /api/v1/applications/:uuid/transitions
//!   POST   /api/v1/transitions
//!   POST   /api/v1/actions/test
//!   POST   /api/v1/criteria/match
//!   POST   /api/v1/settings/reload
//!   GET    /health
//!
//! The acting user is read from the `x-user-id` header.

pub mod error;
pub mod extract;
pub mod handlers;


use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use engine::{SettingsProvider, StageOrchestrator};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use error::ApiError;
pub use extract::{ActingUser, USER_HEADER};

#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: StageOrchestrator,
    /// The provider the executor's template engine reads; `None` without a
    /// settings file.
    pub settings: Option<Arc<SettingsProvider>>,
}

impl AppState {
    pub fn new(orchestrator: StageOrchestrator) -> Self {
        Self {
            orchestrator,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: Arc<SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/templates", put(handlers::templates::save))
        .route("/templates/:form_name", get(handlers::templates::get))
        .route("/applications", post(handlers::applications::create))
        .route("/applications/:uuid/timeline", get(handlers::applications::timeline))
        .route("/applications/:uuid/transitions", get(handlers::applications::transitions))
        .route("/transitions", post(handlers::transitions::apply))
        .route("/actions/test", post(handlers::actions::test))
        .route("/criteria/match", post(handlers::criteria::evaluate))
        .route("/settings/reload", post(handlers::settings::reload));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
