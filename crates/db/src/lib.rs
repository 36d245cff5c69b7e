//! `db` crate — Postgres persistence for the workflow engine.
//!
//! Provides a connection pool, typed row structs, one repository module per
//! table, and [`PgStore`] / [`PgRoles`], the implementations of the engine's
//! store and role traits. No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool, PoolConfig};
pub use store::{PgRoles, PgStore, PgTransaction};
