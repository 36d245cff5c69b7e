//! Repository functions — one function per database operation.
//!
//! Every function takes a `&PgPool` (or an open transaction) and returns
//! `Result<T, DbError>`. No business logic: decoding into domain types
//! happens through the row conversions in [`crate::models`].

pub mod applications;
pub mod mutations;
pub mod templates;
pub mod timeline;
pub mod users;
