//! `users` lookups used for authorization.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// The user's role, or `None` for an unknown user.
pub async fn get_role(pool: &PgPool, user: Uuid) -> Result<Option<String>, DbError> {
    let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE uuid = $1")
        .bind(user)
        .fetch_optional(pool)
        .await?;
    Ok(role)
}
