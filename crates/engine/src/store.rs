//! Persistence and authorization seams of the orchestrator.
//!
//! The engine never talks to a database directly: the `db` crate implements
//! these traits for Postgres and [`crate::memory`] implements them in memory.

use actions::DatabaseHandle;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ApplicationInstance, ApplicationTemplate, TimelineEntry};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    /// Connection, query or (de)serialization failure in the backend.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Templates, instances and their timeline.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// The current template for `form_name`.
    async fn find_template(&self, form_name: &str) -> Result<ApplicationTemplate, StoreError>;

    /// Insert or replace the template for its `form_name`.
    async fn save_template(&self, template: &ApplicationTemplate) -> Result<(), StoreError>;

    async fn find_application(&self, uuid: Uuid) -> Result<ApplicationInstance, StoreError>;

    async fn insert_application(&self, application: &ApplicationInstance) -> Result<(), StoreError>;

    /// Set `status` (and bump `updated_at`) on every listed instance.
    /// Returns the number of rows changed.
    async fn update_status(&self, uuids: &[Uuid], status: &str) -> Result<u64, StoreError>;

    async fn append_timeline_entry(&self, entry: &TimelineEntry) -> Result<(), StoreError>;

    /// Entries for one instance, oldest first.
    async fn timeline(&self, application: Uuid) -> Result<Vec<TimelineEntry>, StoreError>;

    /// Open the transaction one application's actions run in.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// A unit of work that `database_update` actions write through.
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: DatabaseHandle {
    /// `self` as a plain [`DatabaseHandle`].
    fn database(&self) -> &dyn DatabaseHandle;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Maps an acting user to their role.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    /// `None` when the user is unknown or has no role.
    async fn role_of(&self, user: Uuid) -> Result<Option<String>, StoreError>;
}
