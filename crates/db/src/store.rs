//! Postgres implementations of the engine's store and role traits.

use actions::{CollaboratorError, DatabaseHandle, DatabaseMutation};
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use engine::{
    ApplicationInstance, ApplicationTemplate, RoleProvider, StoreError, StoreTransaction,
    TimelineEntry, WorkflowStore,
};

use crate::repository::{applications, mutations, templates, timeline, users};
use crate::{DbError, DbPool};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn find_template(&self, form_name: &str) -> Result<ApplicationTemplate, StoreError> {
        let row = templates::get_template(&self.pool, form_name).await?;
        Ok(ApplicationTemplate::try_from(row)?)
    }

    async fn save_template(&self, template: &ApplicationTemplate) -> Result<(), StoreError> {
        templates::upsert_template(&self.pool, template).await?;
        Ok(())
    }

    async fn find_application(&self, uuid: Uuid) -> Result<ApplicationInstance, StoreError> {
        let row = applications::get_application(&self.pool, uuid).await?;
        Ok(ApplicationInstance::try_from(row)?)
    }

    async fn insert_application(&self, application: &ApplicationInstance) -> Result<(), StoreError> {
        applications::insert_application(&self.pool, application).await?;
        Ok(())
    }

    async fn update_status(&self, uuids: &[Uuid], status: &str) -> Result<u64, StoreError> {
        Ok(applications::update_status(&self.pool, uuids, status).await?)
    }

    async fn append_timeline_entry(&self, entry: &TimelineEntry) -> Result<(), StoreError> {
        timeline::insert_entry(&self.pool, entry).await?;
        Ok(())
    }

    async fn timeline(&self, application: Uuid) -> Result<Vec<TimelineEntry>, StoreError> {
        let rows = timeline::list_entries(&self.pool, application).await?;
        let entries = rows
            .into_iter()
            .map(TimelineEntry::try_from)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(DbError::from)?;
        Ok(Box::new(PgTransaction {
            tx: Mutex::new(Some(tx)),
        }))
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// One application's unit of work. Dropping it unfinished rolls back.
pub struct PgTransaction {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgTransaction {
    async fn take(&self) -> Result<Transaction<'static, Postgres>, DbError> {
        self.tx.lock().await.take().ok_or(DbError::TransactionFinished)
    }
}

fn collaborator_error(err: DbError) -> CollaboratorError {
    match err {
        DbError::Sqlx(sqlx::Error::Database(db)) => CollaboratorError::Rejected(db.to_string()),
        DbError::TransactionFinished => CollaboratorError::Rejected(err.to_string()),
        other => CollaboratorError::Transport(other.to_string()),
    }
}

#[async_trait]
impl DatabaseHandle for PgTransaction {
    #[instrument(skip(self, mutation), fields(table = %mutation.table, operation = %mutation.operation))]
    async fn apply(&self, mutation: &DatabaseMutation) -> Result<u64, CollaboratorError> {
        let statement = mutations::build(mutation).map_err(CollaboratorError::Rejected)?;

        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| collaborator_error(DbError::TransactionFinished))?;

        let affected = mutations::execute(&mut **tx, &statement)
            .await
            .map_err(collaborator_error)?;
        debug!(affected, "mutation applied");
        Ok(affected)
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    fn database(&self) -> &dyn DatabaseHandle {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.take().await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let tx = self.take().await?;
        tx.rollback().await.map_err(DbError::from)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Roles read from the `users` table.
#[derive(Debug, Clone)]
pub struct PgRoles {
    pool: DbPool,
}

impl PgRoles {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleProvider for PgRoles {
    async fn role_of(&self, user: Uuid) -> Result<Option<String>, StoreError> {
        Ok(users::get_role(&self.pool, user).await?)
    }
}
