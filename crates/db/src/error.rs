//! Typed error type for the db crate.

use engine::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSONB column did not hold the expected document.
    #[error("malformed {column} document: {source}")]
    Document {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The transaction was already committed or rolled back.
    #[error("transaction already finished")]
    TransactionFinished,
}

impl DbError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn document(column: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Document { column, source }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, key } => StoreError::NotFound { entity, key },
            other => StoreError::Backend(other.to_string()),
        }
    }
}
