//! # In-Memory Session
//!
//! A [`Session`] backed by process-local tables. Useful for tests and
//! for embedding without a storage engine; capability flags are
//! configurable per instance so both bulk strategies stay exercisable.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::entity::{ID, UPDATED};
use crate::scope::{Predicate, SelectScope};
use crate::session::{
    ensure_id, stamp_insert, Capabilities, Session, SessionError, SessionResult,
};
use crate::value::{RecordValues, Value};

enum PendingOp {
    Insert { table: String, values: RecordValues },
    Update { table: String, values: RecordValues },
    Delete { table: String, id: Uuid },
}

/// In-memory unit of work.
pub struct MemorySession {
    tables: HashMap<String, BTreeMap<Uuid, RecordValues>>,
    pending: Vec<PendingOp>,
    attached: HashSet<(String, Uuid)>,
    capabilities: Capabilities,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::ALL)
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            tables: HashMap::new(),
            pending: Vec::new(),
            attached: HashSet::new(),
            capabilities,
        }
    }

    /// Number of rows currently attached to the unit of work.
    pub fn attached_len(&self) -> usize {
        self.attached.len()
    }

    fn matching(&self, scope: &SelectScope) -> Vec<RecordValues> {
        let mut rows: Vec<RecordValues> = self
            .tables
            .get(scope.table())
            .map(|table| {
                table
                    .values()
                    .filter(|row| matches_predicates(scope.predicates(), row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, ascending)) = scope.order() {
            rows.sort_by(|a, b| {
                let ord = match (a.get(field), b.get(field)) {
                    (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        rows
    }

    fn row(&self, table: &str, id: Uuid) -> Option<&RecordValues> {
        self.tables.get(table).and_then(|rows| rows.get(&id))
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_predicates(predicates: &[Predicate], row: &RecordValues) -> bool {
    predicates.iter().all(|predicate| match predicate {
        Predicate::Eq { field, value } => {
            row.get(field).unwrap_or(&Value::Null).equals(value)
        }
        Predicate::Lt { field, value } => row
            .get(field)
            .map_or(false, |v| matches!(v.compare(value), Some(Ordering::Less))),
        Predicate::Gt { field, value } => row
            .get(field)
            .map_or(false, |v| matches!(v.compare(value), Some(Ordering::Greater))),
        Predicate::In { field, values } => row
            .get(field)
            .map_or(false, |v| values.iter().any(|candidate| v.equals(candidate))),
    })
}

fn apply_pagination(mut rows: Vec<RecordValues>, scope: &SelectScope) -> Vec<RecordValues> {
    let offset = scope.offset().unwrap_or(0) as usize;
    rows = rows.into_iter().skip(offset).collect();
    if let Some(limit) = scope.limit() {
        rows.truncate(limit as usize);
    }
    rows
}

#[async_trait]
impl Session for MemorySession {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn select(&mut self, scope: &SelectScope) -> SessionResult<Vec<RecordValues>> {
        Ok(apply_pagination(self.matching(scope), scope))
    }

    async fn select_with_total(
        &mut self,
        scope: &SelectScope,
    ) -> SessionResult<Vec<(RecordValues, u64)>> {
        let matching = self.matching(scope);
        let total = matching.len() as u64;
        Ok(apply_pagination(matching, scope)
            .into_iter()
            .map(|row| (row, total))
            .collect())
    }

    async fn count(&mut self, scope: &SelectScope) -> SessionResult<u64> {
        Ok(self.matching(scope).len() as u64)
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
        let existing = values
            .get(ID)
            .and_then(Value::as_uuid)
            .and_then(|id| self.row(table, id).cloned());

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
        for op in std::mem::take(&mut self.pending) {
            match op {
                PendingOp::Insert { table, mut values } => {
                    let id = ensure_id(&mut values);
                    stamp_insert(&mut values);
                    let rows = self.tables.entry(table.clone()).or_default();
                    if rows.contains_key(&id) {
                        return Err(SessionError::constraint(format!(
                            "duplicate identifier {id} in {table}"
                        )));
                    }
                    rows.insert(id, values);
                }
                PendingOp::Update { table, mut values } => {
                    let id = values.get(ID).and_then(Value::as_uuid).ok_or_else(|| {
                        SessionError::backend("update row carries no identifier")
                    })?;
                    values.insert(UPDATED, Utc::now());
                    if let Some(slot) = self
                        .tables
                        .get_mut(&table)
                        .and_then(|rows| rows.get_mut(&id))
                    {
                        for (key, value) in values.iter() {
                            slot.insert(key.clone(), value.clone());
                        }
                    }
                }
                PendingOp::Delete { table, id } => {
                    if let Some(rows) = self.tables.get_mut(&table) {
                        rows.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn refresh(&mut self, table: &str, id: Uuid) -> SessionResult<RecordValues> {
        let row = self
            .row(table, id)
            .cloned()
            .ok_or_else(|| SessionError::backend(format!("refresh missed row {id} in {table}")))?;
        self.attached.insert((table.to_string(), id));
        Ok(row)
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
        if returning && !self.capabilities.insert_returning {
            return Err(SessionError::backend(
                "bulk insert with returning is not supported by this backend",
            ));
        }
        let mut inserted = Vec::with_capacity(rows.len());
        for mut values in rows {
            let id = ensure_id(&mut values);
            stamp_insert(&mut values);
            let table_rows = self.tables.entry(table.to_string()).or_default();
            if table_rows.contains_key(&id) {
                return Err(SessionError::constraint(format!(
                    "duplicate identifier {id} in {table}"
                )));
            }
            table_rows.insert(id, values.clone());
            inserted.push(values);
        }
        Ok(returning.then_some(inserted))
    }

    async fn update_many(
        &mut self,
        table: &str,
        rows: Vec<RecordValues>,
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>> {
        if returning && !self.capabilities.update_returning {
            return Err(SessionError::backend(
                "bulk update with returning is not supported by this backend",
            ));
        }
        let mut updated = Vec::with_capacity(rows.len());
        for mut values in rows {
            let id = values
                .get(ID)
                .and_then(Value::as_uuid)
                .ok_or_else(|| SessionError::backend("update row carries no identifier"))?;
            values.insert(UPDATED, Utc::now());
            if let Some(slot) = self
                .tables
                .get_mut(table)
                .and_then(|table_rows| table_rows.get_mut(&id))
            {
                for (key, value) in values.iter() {
                    slot.insert(key.clone(), value.clone());
                }
                updated.push(slot.clone());
            }
        }
        Ok(returning.then_some(updated))
    }

    async fn delete_many(
        &mut self,
        table: &str,
        ids: &[Uuid],
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>> {
        if returning && !self.capabilities.delete_returning {
            return Err(SessionError::backend(
                "bulk delete with returning is not supported by this backend",
            ));
        }
        let mut deleted = Vec::new();
        if let Some(table_rows) = self.tables.get_mut(table) {
            for id in ids {
                if let Some(row) = table_rows.remove(id) {
                    deleted.push(row);
                }
            }
        }
        Ok(returning.then_some(deleted))
    }

    async fn probe(&mut self, query: &str) -> SessionResult<i64> {
        if query.trim().eq_ignore_ascii_case("select 1") {
            Ok(1)
        } else {
            Err(SessionError::backend(format!(
                "unsupported probe statement: {query}"
            )))
        }
    }
}
