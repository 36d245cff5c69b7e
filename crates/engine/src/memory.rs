//! In-memory implementations of the store and role traits.
//!
//! `MemoryStore` keeps templates, instances, the timeline and a set of
//! generic "tables" (for `database_update` actions) behind one mutex.
//! Transactions stage their writes on a private copy of the tables and
//! replay them onto the shared state on commit, so a rolled-back (or
//! dropped) transaction leaves no trace. Like PostgreSQL, a transaction
//! whose statement failed rejects every later statement and commits nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use actions::{CollaboratorError, DatabaseHandle, DatabaseMutation, DbOperation};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::{ApplicationInstance, ApplicationTemplate, TimelineEntry};
use crate::store::{RoleProvider, StoreError, StoreTransaction, WorkflowStore};

pub type Row = Map<String, Value>;
type Tables = HashMap<String, Vec<Row>>;

#[derive(Debug, Default)]
struct State {
    templates: HashMap<String, ApplicationTemplate>,
    applications: HashMap<Uuid, ApplicationInstance>,
    timeline: Vec<TimelineEntry>,
    tables: Tables,
    read_only: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every mutation of `table` fail, like a constraint violation.
    pub fn make_read_only(&self, table: impl Into<String>) {
        self.lock().read_only.push(table.into());
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Insert an instance and nothing else: no creation entry, no actions.
    pub fn seed_application(&self, application: ApplicationInstance) {
        self.lock().applications.insert(application.uuid, application);
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn find_template(&self, form_name: &str) -> Result<ApplicationTemplate, StoreError> {
        self.lock()
            .templates
            .get(form_name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("template", form_name))
    }

    async fn save_template(&self, template: &ApplicationTemplate) -> Result<(), StoreError> {
        self.lock()
            .templates
            .insert(template.form_name.clone(), template.clone());
        Ok(())
    }

    async fn find_application(&self, uuid: Uuid) -> Result<ApplicationInstance, StoreError> {
        self.lock()
            .applications
            .get(&uuid)
            .cloned()
            .ok_or_else(|| StoreError::not_found("application", uuid))
    }

    async fn insert_application(&self, application: &ApplicationInstance) -> Result<(), StoreError> {
        self.lock()
            .applications
            .insert(application.uuid, application.clone());
        Ok(())
    }

    async fn update_status(&self, uuids: &[Uuid], status: &str) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let now = Utc::now();
        let mut changed = 0;
        for uuid in uuids {
            if let Some(app) = state.applications.get_mut(uuid) {
                app.status = status.to_owned();
                app.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn append_timeline_entry(&self, entry: &TimelineEntry) -> Result<(), StoreError> {
        self.lock().timeline.push(entry.clone());
        Ok(())
    }

    async fn timeline(&self, application: Uuid) -> Result<Vec<TimelineEntry>, StoreError> {
        let mut entries: Vec<TimelineEntry> = self
            .lock()
            .timeline
            .iter()
            .filter(|e| e.application_uuid == application)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let (working, read_only) = {
            let state = self.lock();
            (state.tables.clone(), state.read_only.clone())
        };
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            working: Mutex::new(working),
            pending: Mutex::new(Vec::new()),
            read_only,
            aborted: AtomicBool::new(false),
        }))
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub struct MemoryTransaction {
    store: MemoryStore,
    working: Mutex<Tables>,
    pending: Mutex<Vec<DatabaseMutation>>,
    read_only: Vec<String>,
    aborted: AtomicBool,
}

#[async_trait]
impl DatabaseHandle for MemoryTransaction {
    async fn apply(&self, mutation: &DatabaseMutation) -> Result<u64, CollaboratorError> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected(
                "current transaction is aborted, commands ignored until end of transaction block".to_owned(),
            ));
        }
        if self.read_only.contains(&mutation.table) {
            self.aborted.store(true, Ordering::SeqCst);
            return Err(CollaboratorError::Rejected(format!(
                "table '{}' is read-only",
                mutation.table
            )));
        }
        let mut working = self.working.lock().unwrap_or_else(PoisonError::into_inner);
        let affected = apply_mutation(&mut working, mutation);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mutation.clone());
        Ok(affected)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn database(&self) -> &dyn DatabaseHandle {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if this.aborted.into_inner() {
            return Ok(());
        }
        let pending = this.pending.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut state = this.store.lock();
        for mutation in &pending {
            apply_mutation(&mut state.tables, mutation);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn row_matches(row: &Row, conditions: &Row) -> bool {
    conditions.iter().all(|(key, expected)| row.get(key) == Some(expected))
}

fn apply_mutation(tables: &mut Tables, mutation: &DatabaseMutation) -> u64 {
    let rows = tables.entry(mutation.table.clone()).or_default();
    match mutation.operation {
        DbOperation::Insert => {
            rows.push(mutation.data.clone());
            1
        }
        DbOperation::Update => {
            let mut affected = 0;
            for row in rows.iter_mut().filter(|r| row_matches(r, &mutation.conditions)) {
                for (key, value) in &mutation.data {
                    row.insert(key.clone(), value.clone());
                }
                affected += 1;
            }
            affected
        }
        DbOperation::Delete => {
            let before = rows.len();
            rows.retain(|r| !row_matches(r, &mutation.conditions));
            (before - rows.len()) as u64
        }
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A fixed user -> role table.
#[derive(Debug, Default, Clone)]
pub struct StaticRoles {
    roles: HashMap<Uuid, String>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user: Uuid, role: impl Into<String>) -> Self {
        self.roles.insert(user, role.into());
        self
    }
}

#[async_trait]
impl RoleProvider for StaticRoles {
    async fn role_of(&self, user: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.roles.get(&user).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(table: &str) -> DatabaseMutation {
        DatabaseMutation {
            table: table.into(),
            operation: DbOperation::Insert,
            data: json!({ "n": 1 }).as_object().cloned().unwrap(),
            conditions: Map::new(),
        }
    }

    #[tokio::test]
    async fn failed_statement_aborts_the_transaction() {
        let store = MemoryStore::new();
        store.make_read_only("locked");
        let tx = store.begin().await.unwrap();

        tx.database().apply(&insert("open")).await.unwrap();
        assert!(tx.database().apply(&insert("locked")).await.is_err());
        let err = tx.database().apply(&insert("open")).await.unwrap_err();
        assert!(err.to_string().contains("aborted"), "{err}");

        tx.commit().await.unwrap();
        assert!(store.rows("open").is_empty());
    }
}
