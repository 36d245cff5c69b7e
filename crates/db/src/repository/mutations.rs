//! SQL for `database_update` actions.
//!
//! The table and column names come from template configuration, so every
//! identifier is checked and double-quoted; values never reach the SQL text.
//! They are bound as one JSONB document and converted to the column types by
//! `jsonb_populate_record`. Conditions are matched with `to_jsonb(row) @>`,
//! i.e. as JSON equality on the listed columns.

use actions::{DatabaseMutation, DbOperation};
use serde_json::{Map, Value};
use sqlx::PgConnection;

use crate::DbError;

/// A statement ready to run, with its JSONB parameters in order.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationSql {
    pub sql: String,
    pub params: Vec<Value>,
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(part: &str) -> Result<String, String> {
    if is_identifier(part) {
        Ok(format!("\"{part}\""))
    } else {
        Err(format!("'{part}' is not a plain identifier"))
    }
}

/// `schema.table` or `table`, quoted.
fn quote_table(table: &str) -> Result<String, String> {
    let parts = table
        .split('.')
        .map(quote)
        .collect::<Result<Vec<_>, _>>()?;
    if parts.is_empty() || parts.len() > 2 {
        return Err(format!("'{table}' is not a table name"));
    }
    Ok(parts.join("."))
}

fn quote_columns(data: &Map<String, Value>) -> Result<Vec<String>, String> {
    data.keys().map(|k| quote(k)).collect()
}

/// Build the statement for `mutation`.
///
/// # Errors
/// A message naming the offending identifier, or the missing `data` /
/// `conditions` document.
pub fn build(mutation: &DatabaseMutation) -> Result<MutationSql, String> {
    let table = quote_table(&mutation.table)?;

    match mutation.operation {
        DbOperation::Insert => {
            let columns = quote_columns(&mutation.data)?;
            if columns.is_empty() {
                return Err("insert needs at least one column in data".into());
            }
            let list = columns.join(", ");
            Ok(MutationSql {
                sql: format!(
                    "INSERT INTO {table} ({list}) SELECT {list} FROM jsonb_populate_record(NULL::{table}, $1)"
                ),
                params: vec![Value::Object(mutation.data.clone())],
            })
        }

        DbOperation::Update => {
            let columns = quote_columns(&mutation.data)?;
            if columns.is_empty() {
                return Err("update needs at least one column in data".into());
            }
            if mutation.conditions.is_empty() {
                return Err("update needs conditions".into());
            }
            let assignments = columns
                .iter()
                .map(|c| format!("{c} = src.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            Ok(MutationSql {
                sql: format!(
                    "UPDATE {table} AS target SET {assignments} \
                     FROM jsonb_populate_record(NULL::{table}, $1) AS src \
                     WHERE to_jsonb(target) @> $2"
                ),
                params: vec![
                    Value::Object(mutation.data.clone()),
                    Value::Object(mutation.conditions.clone()),
                ],
            })
        }

        DbOperation::Delete => {
            if mutation.conditions.is_empty() {
                return Err("delete needs conditions".into());
            }
            Ok(MutationSql {
                sql: format!("DELETE FROM {table} AS target WHERE to_jsonb(target) @> $1"),
                params: vec![Value::Object(mutation.conditions.clone())],
            })
        }
    }
}

/// Run a built statement on `conn`, returning the rows affected.
pub async fn execute(conn: &mut PgConnection, statement: &MutationSql) -> Result<u64, DbError> {
    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = query.bind(param.clone());
    }
    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mutation(table: &str, operation: DbOperation, data: Value, conditions: Value) -> DatabaseMutation {
        DatabaseMutation {
            table: table.into(),
            operation,
            data: data.as_object().cloned().unwrap_or_default(),
            conditions: conditions.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn insert_lists_only_given_columns() {
        let sql = build(&mutation(
            "licences",
            DbOperation::Insert,
            json!({ "holder": "Ada", "active": true }),
            json!({}),
        ))
        .unwrap();

        // serde_json maps keep keys sorted.
        assert_eq!(
            sql.sql,
            "INSERT INTO \"licences\" (\"active\", \"holder\") SELECT \"active\", \"holder\" \
             FROM jsonb_populate_record(NULL::\"licences\", $1)"
        );
        assert_eq!(sql.params, vec![json!({ "holder": "Ada", "active": true })]);
    }

    #[test]
    fn update_binds_data_then_conditions() {
        let sql = build(&mutation(
            "public.licences",
            DbOperation::Update,
            json!({ "active": false }),
            json!({ "code": "LIC-42" }),
        ))
        .unwrap();

        assert!(sql.sql.starts_with("UPDATE \"public\".\"licences\" AS target SET \"active\" = src.\"active\""));
        assert!(sql.sql.ends_with("WHERE to_jsonb(target) @> $2"));
        assert_eq!(sql.params[1], json!({ "code": "LIC-42" }));
    }

    #[test]
    fn delete_requires_conditions() {
        let err = build(&mutation("audit", DbOperation::Delete, json!({}), json!({}))).unwrap_err();
        assert!(err.contains("conditions"));

        let sql = build(&mutation("audit", DbOperation::Delete, json!({}), json!({ "id": 3 }))).unwrap();
        assert_eq!(sql.sql, "DELETE FROM \"audit\" AS target WHERE to_jsonb(target) @> $1");
    }

    #[test]
    fn hostile_identifiers_are_refused() {
        for table in ["licences; DROP TABLE users", "a.b.c", "\"quoted\"", ""] {
            assert!(
                build(&mutation(table, DbOperation::Delete, json!({}), json!({ "id": 1 }))).is_err(),
                "{table}"
            );
        }
        let err = build(&mutation(
            "licences",
            DbOperation::Insert,
            json!({ "name\" = 1; --": "x" }),
            json!({}),
        ))
        .unwrap_err();
        assert!(err.contains("identifier"));
    }
}
