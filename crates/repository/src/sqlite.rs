//! # SQLite Session
//!
//! [`Session`] implementation over `sqlx`'s SQLite driver. The session
//! owns a transaction for its whole lifetime: repository operations
//! flush into it, and the caller decides when to [`commit`] or
//! [`rollback`].
//!
//! Identifiers and timestamps are bound as TEXT (`to_string()` /
//! RFC 3339 with fixed microsecond precision) so stored values compare
//! correctly under the engine's lexicographic TEXT ordering.
//!
//! [`commit`]: SqliteSession::commit
//! [`rollback`]: SqliteSession::rollback

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::config::DatabaseConfig;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entity::{ID, UPDATED};
use crate::scope::{Predicate, SelectScope};
use crate::session::{
    ensure_id, stamp_insert, Capabilities, Session, SessionError, SessionResult,
};
use crate::value::{RecordValues, Value};

/// Column alias carrying the windowed total in `select_with_total`.
const TOTAL_COLUMN: &str = "_total";

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            use sqlx::error::ErrorKind;
            match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return SessionError::ConstraintViolation {
                        constraint: db.message().to_string(),
                    };
                }
                _ => {}
            }
        }
        SessionError::Backend {
            message: err.to_string(),
        }
    }
}

/// Establish a SQLite connection pool from configuration.
pub async fn establish_pool(config: &DatabaseConfig) -> SessionResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(&config.url)
        .await?;

    info!(
        "SQLite connection pool established with {} max connections",
        config.max_connections
    );

    Ok(pool)
}

enum PendingOp {
    Insert { table: String, values: RecordValues },
    Update { table: String, values: RecordValues },
    Delete { table: String, id: Uuid },
}

/// SQLite unit of work.
pub struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
    pending: Vec<PendingOp>,
    attached: HashSet<(String, Uuid)>,
}

impl SqliteSession {
    /// Begin a unit of work on the pool. The caller owns commit and
    /// rollback timing; repository operations only flush.
    pub async fn begin(pool: &SqlitePool) -> SessionResult<Self> {
        let tx = pool.begin().await?;
        debug!("sqlite unit of work started");
        Ok(Self {
            tx,
            pending: Vec::new(),
            attached: HashSet::new(),
        })
    }

    /// Flush any queued mutations and commit the transaction.
    pub async fn commit(mut self) -> SessionResult<()> {
        self.flush_pending().await?;
        self.tx.commit().await?;
        debug!("sqlite unit of work committed");
        Ok(())
    }

    /// Number of rows currently attached to the unit of work.
    pub fn attached_len(&self) -> usize {
        self.attached.len()
    }

    /// Discard the unit of work.
    pub async fn rollback(self) -> SessionResult<()> {
        self.tx.rollback().await?;
        debug!("sqlite unit of work rolled back");
        Ok(())
    }

    async fn flush_pending(&mut self) -> SessionResult<()> {
        for op in std::mem::take(&mut self.pending) {
            match op {
                PendingOp::Insert { table, mut values } => {
                    ensure_id(&mut values);
                    stamp_insert(&mut values);
                    let (sql, binds) = insert_sql(&table, &values);
                    execute(&mut self.tx, &sql, &binds).await?;
                }
                PendingOp::Update { table, mut values } => {
                    values.insert(UPDATED, Value::DateTime(Utc::now()));
                    let (sql, binds) = update_sql(&table, &values)?;
                    execute(&mut self.tx, &sql, &binds).await?;
                }
                PendingOp::Delete { table, id } => {
                    let sql = format!("DELETE FROM {table} WHERE {ID} = ?");
                    let binds = vec![Value::Uuid(id)];
                    execute(&mut self.tx, &sql, &binds).await?;
                }
            }
        }
        Ok(())
    }

    async fn fetch_rows(&mut self, sql: &str, binds: &[Value]) -> SessionResult<Vec<SqliteRow>> {
        debug!(sql, "executing query");
        let mut query = sqlx::query(sql);
        for value in binds {
            query = bind_value(query, value);
        }
        Ok(query.fetch_all(&mut *self.tx).await?)
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn capabilities(&self) -> Capabilities {
        // engine facts: multi-row INSERT and DELETE can return rows in
        // one statement, multi-row UPDATE cannot
        Capabilities {
            insert_returning: true,
            update_returning: false,
            delete_returning: true,
        }
    }

    async fn select(&mut self, scope: &SelectScope) -> SessionResult<Vec<RecordValues>> {
        let (sql, binds) = select_sql(scope, false);
        let rows = self.fetch_rows(&sql, &binds).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn select_with_total(
        &mut self,
        scope: &SelectScope,
    ) -> SessionResult<Vec<(RecordValues, u64)>> {
        let (sql, binds) = select_sql(scope, true);
        let rows = self.fetch_rows(&sql, &binds).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let total: i64 = row.try_get(TOTAL_COLUMN).map_err(SessionError::from)?;
            out.push((decode_row(row)?, total as u64));
        }
        Ok(out)
    }

    async fn count(&mut self, scope: &SelectScope) -> SessionResult<u64> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", scope.table());
        let mut binds = Vec::new();
        push_predicates(&mut sql, &mut binds, scope.predicates());
        let rows = self.fetch_rows(&sql, &binds).await?;
        let row = rows
            .first()
            .ok_or_else(|| SessionError::backend("count query returned no rows"))?;
        let count: i64 = row.try_get(0).map_err(SessionError::from)?;
        Ok(count as u64)
    }

    fn add(&mut self, table: &str, mut values: RecordValues) -> Uuid {
        let id = ensure_id(&mut values);
        self.pending.push(PendingOp::Insert {
            table: table.to_string(),
            values,
        });
        self.attached.insert((table.to_string(), id));
        id
    }

    async fn merge(&mut self, table: &str, mut values: RecordValues) -> SessionResult<RecordValues> {
        let existing = match values.get(ID).and_then(Value::as_uuid) {
            Some(id) => {
                let sql = format!("SELECT * FROM {table} WHERE {ID} = ?");
                let rows = self.fetch_rows(&sql, &[Value::Uuid(id)]).await?;
                rows.first().map(decode_row).transpose()?
            }
            None => None,
        };

        let merged = match existing {
            Some(mut row) => {
                for (key, value) in values.iter() {
                    row.insert(key.clone(), value.clone());
                }
                self.pending.push(PendingOp::Update {
                    table: table.to_string(),
                    values: row.clone(),
                });
                row
            }
            None => {
                ensure_id(&mut values);
                self.pending.push(PendingOp::Insert {
                    table: table.to_string(),
                    values: values.clone(),
                });
                values
            }
        };

        if let Some(id) = merged.get(ID).and_then(Value::as_uuid) {
            self.attached.insert((table.to_string(), id));
        }
        Ok(merged)
    }

    fn delete(&mut self, table: &str, id: Uuid) {
        self.pending.push(PendingOp::Delete {
            table: table.to_string(),
            id,
        });
    }

    async fn flush(&mut self) -> SessionResult<()> {
        self.flush_pending().await
    }

    async fn refresh(&mut self, table: &str, id: Uuid) -> SessionResult<RecordValues> {
        let sql = format!("SELECT * FROM {table} WHERE {ID} = ?");
        let rows = self.fetch_rows(&sql, &[Value::Uuid(id)]).await?;
        let row = rows
            .first()
            .ok_or_else(|| SessionError::backend(format!("refresh missed row {id} in {table}")))?;
        self.attached.insert((table.to_string(), id));
        decode_row(row)
    }

    fn expunge(&mut self, table: &str, id: Uuid) {
        self.attached.remove(&(table.to_string(), id));
    }

    async fn insert_many(
        &mut self,
        table: &str,
        rows: Vec<RecordValues>,
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>> {
        if returning && !self.capabilities().insert_returning {
            return Err(SessionError::backend(
                "bulk insert with returning is not supported by this backend",
            ));
        }
        if rows.is_empty() {
            return Ok(returning.then(Vec::new));
        }

        // client-side defaults, the engine's column-default equivalent
        let mut rows = rows;
        for row in &mut rows {
            ensure_id(row);
            stamp_insert(row);
        }

        let columns: Vec<String> = rows[0].keys().cloned().collect();
        let placeholder_row = format!(
            "({})",
            columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
        );
        let mut sql = format!(
            "INSERT INTO {table} ({}) VALUES {}",
            columns.join(", "),
            std::iter::repeat(placeholder_row.as_str())
                .take(rows.len())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut binds = Vec::with_capacity(rows.len() * columns.len());
        for row in &rows {
            for column in &columns {
                binds.push(row.get(column).cloned().unwrap_or(Value::Null));
            }
        }

        if returning {
            sql.push_str(" RETURNING *");
            let returned = self.fetch_rows(&sql, &binds).await?;
            let decoded: SessionResult<Vec<RecordValues>> =
                returned.iter().map(decode_row).collect();
            return Ok(Some(decoded?));
        }

        execute(&mut self.tx, &sql, &binds).await?;
        Ok(None)
    }

    async fn update_many(
        &mut self,
        table: &str,
        rows: Vec<RecordValues>,
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>> {
        if returning && !self.capabilities().update_returning {
            return Err(SessionError::backend(
                "bulk update with returning is not supported by this backend",
            ));
        }
        for mut values in rows {
            values.insert(UPDATED, Value::DateTime(Utc::now()));
            let (sql, binds) = update_sql(table, &values)?;
            execute(&mut self.tx, &sql, &binds).await?;
        }
        Ok(None)
    }

    async fn delete_many(
        &mut self,
        table: &str,
        ids: &[Uuid],
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>> {
        if returning && !self.capabilities().delete_returning {
            return Err(SessionError::backend(
                "bulk delete with returning is not supported by this backend",
            ));
        }
        if ids.is_empty() {
            return Ok(returning.then(Vec::new));
        }

        let mut sql = format!(
            "DELETE FROM {table} WHERE {ID} IN ({})",
            ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
        );
        let binds: Vec<Value> = ids.iter().copied().map(Value::Uuid).collect();

        if returning {
            sql.push_str(" RETURNING *");
            let returned = self.fetch_rows(&sql, &binds).await?;
            let decoded: SessionResult<Vec<RecordValues>> =
                returned.iter().map(decode_row).collect();
            return Ok(Some(decoded?));
        }

        execute(&mut self.tx, &sql, &binds).await?;
        Ok(None)
    }

    async fn probe(&mut self, query: &str) -> SessionResult<i64> {
        let row = sqlx::query(query).fetch_one(&mut *self.tx).await?;
        Ok(row.try_get(0)?)
    }
}

async fn execute(
    tx: &mut Transaction<'static, Sqlite>,
    sql: &str,
    binds: &[Value],
) -> SessionResult<()> {
    debug!(sql, "executing statement");
    let mut query = sqlx::query(sql);
    for value in binds {
        query = bind_value(query, value);
    }
    query.execute(&mut **tx).await?;
    Ok(())
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Uuid(u) => query.bind(u.to_string()),
        Value::DateTime(ts) => query.bind(encode_datetime(ts)),
    }
}

/// Fixed-precision RFC 3339 so TEXT comparison matches time order.
fn encode_datetime(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn select_sql(scope: &SelectScope, with_total: bool) -> (String, Vec<Value>) {
    let mut sql = if with_total {
        format!(
            "SELECT *, COUNT(*) OVER () AS {TOTAL_COLUMN} FROM {}",
            scope.table()
        )
    } else {
        format!("SELECT * FROM {}", scope.table())
    };
    let mut binds = Vec::new();
    push_predicates(&mut sql, &mut binds, scope.predicates());

    if let Some((field, ascending)) = scope.order() {
        sql.push_str(&format!(
            " ORDER BY {field} {}",
            if ascending { "ASC" } else { "DESC" }
        ));
    }

    match (scope.limit(), scope.offset()) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
        // OFFSET requires a LIMIT clause; -1 means unbounded
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        (None, None) => {}
    }

    (sql, binds)
}

fn push_predicates(sql: &mut String, binds: &mut Vec<Value>, predicates: &[Predicate]) {
    if predicates.is_empty() {
        return;
    }
    sql.push_str(" WHERE ");
    for (i, predicate) in predicates.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        match predicate {
            Predicate::Eq { field, value } if value.is_null() => {
                sql.push_str(&format!("{field} IS NULL"));
            }
            Predicate::Eq { field, value } => {
                sql.push_str(&format!("{field} = ?"));
                binds.push(value.clone());
            }
            Predicate::Lt { field, value } => {
                sql.push_str(&format!("{field} < ?"));
                binds.push(value.clone());
            }
            Predicate::Gt { field, value } => {
                sql.push_str(&format!("{field} > ?"));
                binds.push(value.clone());
            }
            Predicate::In { field, values } => {
                if values.is_empty() {
                    sql.push_str("1 = 0");
                } else {
                    sql.push_str(&format!(
                        "{field} IN ({})",
                        values.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
                    ));
                    binds.extend(values.iter().cloned());
                }
            }
        }
    }
}

fn insert_sql(table: &str, values: &RecordValues) -> (String, Vec<Value>) {
    let columns: Vec<String> = values.keys().cloned().collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ")
    );
    let binds = columns
        .iter()
        .map(|column| values.get(column).cloned().unwrap_or(Value::Null))
        .collect();
    (sql, binds)
}

fn update_sql(table: &str, values: &RecordValues) -> SessionResult<(String, Vec<Value>)> {
    let id = values
        .get(ID)
        .and_then(Value::as_uuid)
        .ok_or_else(|| SessionError::backend("update row carries no identifier"))?;

    let columns: Vec<String> = values.keys().filter(|key| *key != ID).cloned().collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE {ID} = ?",
        columns
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let mut binds: Vec<Value> = columns
        .iter()
        .map(|column| values.get(column).cloned().unwrap_or(Value::Null))
        .collect();
    binds.push(Value::Uuid(id));
    Ok((sql, binds))
}

fn decode_row(row: &SqliteRow) -> SessionResult<RecordValues> {
    let mut values = RecordValues::new();
    for column in row.columns() {
        let name = column.name();
        if name == TOTAL_COLUMN {
            continue;
        }
        values.insert(name, decode_column(row, column.ordinal())?);
    }
    Ok(values)
}

fn decode_column(row: &SqliteRow, index: usize) -> SessionResult<Value> {
    let (is_null, type_name) = {
        let raw = row.try_get_raw(index).map_err(SessionError::from)?;
        (raw.is_null(), raw.type_info().name().to_string())
    };
    if is_null {
        return Ok(Value::Null);
    }
    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Ok(Value::Int(row.try_get(index)?)),
        "REAL" => Ok(Value::Float(row.try_get(index)?)),
        "TEXT" => Ok(Value::Text(row.try_get(index)?)),
        other => Err(SessionError::backend(format!(
            "unsupported column type {other} at index {index}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::SelectScope;

    #[test]
    fn test_select_sql_shape() {
        let scope = SelectScope::new("author")
            .where_eq("name", "Ada")
            .where_gt("created", Value::Int(0))
            .order_by("created", true)
            .paginate(10, 5);

        let (sql, binds) = select_sql(&scope, false);
        assert_eq!(
            sql,
            "SELECT * FROM author WHERE name = ? AND created > ? \
             ORDER BY created ASC LIMIT 10 OFFSET 5"
        );
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_select_sql_with_total_window() {
        let scope = SelectScope::new("author").paginate(5, 0);
        let (sql, _) = select_sql(&scope, true);
        assert!(sql.starts_with("SELECT *, COUNT(*) OVER () AS _total FROM author"));
        assert!(sql.ends_with("LIMIT 5 OFFSET 0"));
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let scope = SelectScope::new("author").where_eq("deleted", Value::Null);
        let (sql, binds) = select_sql(&scope, false);
        assert_eq!(sql, "SELECT * FROM author WHERE deleted IS NULL");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_update_sql_excludes_identifier_from_set_clause() {
        let id = Uuid::new_v4();
        let values = RecordValues::new().with(ID, id).with("name", "Ada");
        let (sql, binds) = update_sql("author", &values).unwrap();
        assert_eq!(sql, "UPDATE author SET name = ? WHERE id = ?");
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn test_encode_datetime_fixed_precision() {
        let ts = Utc::now();
        let encoded = encode_datetime(&ts);
        // 2026-08-06T12:34:56.123456Z
        assert_eq!(encoded.len(), 27);
        assert!(encoded.ends_with('Z'));
    }
}
