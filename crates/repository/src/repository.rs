//! # Repository Core
//!
//! Generic CRUD, filtered listing, counting and bulk mutation over any
//! [`Record`] type, against a caller-owned [`Session`]. Callers never see
//! the storage engine's query language: they supply a base scope plus
//! filters and equality constraints, and receive detached record values
//! or counts.
//!
//! Every returned record is detached from the unit of work — a faithful
//! point-in-time snapshot of durable state post-flush that the caller
//! owns outright. The session is only borrowed: the repository flushes,
//! but never commits, rolls back or closes it.
//!
//! Bulk operations branch on the session's capability flags: where the
//! engine can mutate and return rows in a single round trip, one
//! statement is issued; otherwise the mutation happens first and the
//! affected rows are re-selected by identifier membership.

use std::marker::PhantomData;

use common::error::{RepositoryError, RepositoryResult};
use uuid::Uuid;

use crate::entity::{Record, ID};
use crate::filters::Filter;
use crate::scope::SelectScope;
use crate::session::Session;
use crate::value::{RecordValues, Value};

/// Default statement for [`check_health`].
const HEALTH_CHECK_QUERY: &str = "SELECT 1";

/// Equality constraints: field name / expected value pairs combined by
/// conjunction.
pub type EqFilters<'a> = &'a [(&'a str, Value)];

/// Generic repository over a record type.
///
/// A repository is a cheap stateless value: a base scope plus a type
/// marker. Construct one per record type and reuse it freely; the unit
/// of work is passed into every operation and must stay valid for the
/// full call.
pub struct Repository<T: Record> {
    base: SelectScope,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Repository<T> {
    pub fn new() -> Self {
        Self::with_scope(SelectScope::new(T::TABLE))
    }

    /// Start from a customized base scope (extra predicates, ordering).
    pub fn with_scope(base: SelectScope) -> Self {
        Self {
            base,
            _record: PhantomData,
        }
    }

    /// Get the record identified by `id`.
    ///
    /// Fails with `NotFound` if absent.
    pub async fn get(&self, session: &mut dyn Session, id: Uuid) -> RepositoryResult<T> {
        self.get_one_or_none(session, &[(ID, Value::Uuid(id))])
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("{} with id {id}", T::TABLE)))
    }

    /// Get the single record matching the conjunction of `eq`.
    ///
    /// Fails with `NotFound` if absent.
    pub async fn get_one(&self, session: &mut dyn Session, eq: EqFilters<'_>) -> RepositoryResult<T> {
        self.get_one_or_none(session, eq).await?.ok_or_else(|| {
            RepositoryError::not_found(format!("{} matching {}", T::TABLE, describe_eq(eq)))
        })
    }

    /// Like [`Repository::get_one`], but absence is an empty result, not
    /// an error.
    pub async fn get_one_or_none(
        &self,
        session: &mut dyn Session,
        eq: EqFilters<'_>,
    ) -> RepositoryResult<Option<T>> {
        let scope = self.filter_collection_by_kwargs(self.base.clone(), eq);
        let mut rows = session.select(&scope).await?;
        if rows.len() > 1 {
            // the engine's multiple-results failure, translated generically
            return Err(RepositoryError::storage(format!(
                "expected at most one {} matching {}, found {}",
                T::TABLE,
                describe_eq(eq),
                rows.len()
            )));
        }
        match rows.pop() {
            Some(row) => {
                detach(session, T::TABLE, &row);
                Ok(Some(T::from_values(&row)?))
            }
            None => Ok(None),
        }
    }

    /// Get the record matching `eq`, creating it from those constraints
    /// when absent. Returns the record and whether it was created.
    ///
    /// The lookup and the insert are not atomic: concurrent callers can
    /// race to create, and the loser surfaces `Conflict` when a
    /// uniqueness constraint backs the lookup fields.
    pub async fn get_or_create(
        &self,
        session: &mut dyn Session,
        eq: EqFilters<'_>,
    ) -> RepositoryResult<(T, bool)> {
        if let Some(existing) = self.get_one_or_none(session, eq).await? {
            return Ok((existing, false));
        }
        let mut values = RecordValues::new();
        for (field, value) in eq {
            values.insert(*field, value.clone());
        }
        let id = session.add(T::TABLE, values);
        session.flush().await?;
        let row = session.refresh(T::TABLE, id).await?;
        session.expunge(T::TABLE, id);
        Ok((T::from_values(&row)?, true))
    }

    /// Count the records matching `filters` and `eq`, ignoring any
    /// pagination filter.
    pub async fn count(
        &self,
        session: &mut dyn Session,
        filters: &[Filter],
        eq: EqFilters<'_>,
    ) -> RepositoryResult<u64> {
        let scope = self.apply_filters(self.base.clone(), filters, false);
        let scope = self.filter_collection_by_kwargs(scope, eq);
        Ok(session.count(&scope).await?)
    }

    /// List the records matching `filters` and `eq`, detached.
    pub async fn list(
        &self,
        session: &mut dyn Session,
        filters: &[Filter],
        eq: EqFilters<'_>,
    ) -> RepositoryResult<Vec<T>> {
        let scope = self.apply_filters(self.base.clone(), filters, true);
        let scope = self.filter_collection_by_kwargs(scope, eq);
        let rows = session.select(&scope).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            detach(session, T::TABLE, row);
            records.push(T::from_values(row)?);
        }
        Ok(records)
    }

    /// List the paginated records together with the total count of the
    /// unpaginated matching set, in a single round trip.
    ///
    /// The total rides along as a windowed count identical on every row,
    /// so it is read once from the first.
    pub async fn list_and_count(
        &self,
        session: &mut dyn Session,
        filters: &[Filter],
        eq: EqFilters<'_>,
    ) -> RepositoryResult<(Vec<T>, u64)> {
        let scope = self.apply_filters(self.base.clone(), filters, true);
        let scope = self.filter_collection_by_kwargs(scope, eq);
        let rows = session.select_with_total(&scope).await?;
        let total = rows.first().map(|(_, total)| *total).unwrap_or(0);
        let mut records = Vec::with_capacity(rows.len());
        for (row, _) in &rows {
            detach(session, T::TABLE, row);
            records.push(T::from_values(row)?);
        }
        Ok((records, total))
    }

    /// Add `record` to the collection and return it with generated
    /// fields (identifier, timestamps) populated.
    pub async fn add(&self, session: &mut dyn Session, record: T) -> RepositoryResult<T> {
        let id = session.add(T::TABLE, record.to_values());
        session.flush().await?;
        let row = session.refresh(T::TABLE, id).await?;
        session.expunge(T::TABLE, id);
        T::from_values(&row)
    }

    /// Add many records in one bulk statement.
    ///
    /// Where the connection supports bulk insert with returning, the
    /// inserted rows come back in the same round trip. Otherwise every
    /// row gets an identifier pre-assigned locally, the bulk insert runs
    /// without returning, and the rows are re-selected by identifier
    /// membership. Both paths yield detached records reflecting
    /// post-insert generated fields.
    pub async fn add_many(
        &self,
        session: &mut dyn Session,
        records: Vec<T>,
    ) -> RepositoryResult<Vec<T>> {
        let mut rows: Vec<RecordValues> = records.iter().map(Record::to_values).collect();
        if session.capabilities().insert_returning {
            let inserted = session
                .insert_many(T::TABLE, rows, true)
                .await?
                .unwrap_or_default();
            return inserted.iter().map(T::from_values).collect();
        }

        let mut ids = Vec::with_capacity(rows.len());
        for row in &mut rows {
            let id = row
                .get(ID)
                .and_then(Value::as_uuid)
                .unwrap_or_else(Uuid::new_v4);
            row.insert(ID, Value::Uuid(id));
            ids.push(Value::Uuid(id));
        }
        session.insert_many(T::TABLE, rows, false).await?;
        self.list(session, &[Filter::membership(ID, ids)], &[]).await
    }

    /// Update the stored record with the field values present on
    /// `record`.
    ///
    /// Fails with `NotFound` when no record with the same identifier
    /// exists.
    pub async fn update(&self, session: &mut dyn Session, record: T) -> RepositoryResult<T> {
        let id = record
            .id()
            .ok_or_else(|| RepositoryError::not_found(format!("{} without identifier", T::TABLE)))?;
        // raises NotFound before anything is attached
        self.get(session, id).await?;
        session.merge(T::TABLE, record.to_values()).await?;
        session.flush().await?;
        let row = session.refresh(T::TABLE, id).await?;
        session.expunge(T::TABLE, id);
        T::from_values(&row)
    }

    /// Update many records, branching on the capability flag exactly as
    /// [`Repository::add_many`] does.
    pub async fn update_many(
        &self,
        session: &mut dyn Session,
        records: Vec<T>,
    ) -> RepositoryResult<Vec<T>> {
        let rows: Vec<RecordValues> = records.iter().map(Record::to_values).collect();
        if session.capabilities().update_returning {
            let updated = session
                .update_many(T::TABLE, rows, true)
                .await?
                .unwrap_or_default();
            session.flush().await?;
            let mut records = Vec::with_capacity(updated.len());
            for row in &updated {
                detach(session, T::TABLE, row);
                records.push(T::from_values(row)?);
            }
            return Ok(records);
        }

        let ids: Vec<Value> = rows
            .iter()
            .filter_map(|row| row.get(ID).and_then(Value::as_uuid))
            .map(Value::Uuid)
            .collect();
        session.update_many(T::TABLE, rows, false).await?;
        session.flush().await?;
        self.list(session, &[Filter::membership(ID, ids)], &[]).await
    }

    /// Delete the record identified by `id`, returning its pre-deletion
    /// snapshot.
    ///
    /// Fails with `NotFound` if absent.
    pub async fn delete(&self, session: &mut dyn Session, id: Uuid) -> RepositoryResult<T> {
        let record = self.get(session, id).await?;
        session.delete(T::TABLE, id);
        session.flush().await?;
        session.expunge(T::TABLE, id);
        Ok(record)
    }

    /// Delete many records by identifier, returning their pre-deletion
    /// snapshots.
    ///
    /// With bulk delete-with-returning support this is one round trip;
    /// otherwise the set is pre-fetched, then deleted.
    pub async fn delete_many(
        &self,
        session: &mut dyn Session,
        ids: &[Uuid],
    ) -> RepositoryResult<Vec<T>> {
        if session.capabilities().delete_returning {
            let deleted = session
                .delete_many(T::TABLE, ids, true)
                .await?
                .unwrap_or_default();
            session.flush().await?;
            let mut records = Vec::with_capacity(deleted.len());
            for row in &deleted {
                detach(session, T::TABLE, row);
                records.push(T::from_values(row)?);
            }
            return Ok(records);
        }

        let values: Vec<Value> = ids.iter().copied().map(Value::Uuid).collect();
        let records = self
            .list(session, &[Filter::membership(ID, values)], &[])
            .await?;
        session.delete_many(T::TABLE, ids, false).await?;
        session.flush().await?;
        // already detached by the list above
        Ok(records)
    }

    /// Update `record` if its identifier is known to the collection,
    /// create it otherwise.
    pub async fn upsert(&self, session: &mut dyn Session, record: T) -> RepositoryResult<T> {
        let merged = session.merge(T::TABLE, record.to_values()).await?;
        let id = merged.uuid(ID)?;
        session.flush().await?;
        let row = session.refresh(T::TABLE, id).await?;
        session.expunge(T::TABLE, id);
        T::from_values(&row)
    }

    /// Pure predicate-composition helper: refine `scope` with equality
    /// constraints only. Used internally and exposed for callers building
    /// custom scopes.
    pub fn filter_collection_by_kwargs(
        &self,
        mut scope: SelectScope,
        eq: EqFilters<'_>,
    ) -> SelectScope {
        for (field, value) in eq {
            scope = scope.where_eq(*field, value.clone());
        }
        scope
    }

    /// Apply `filters` to `scope` in caller order. Pagination is only
    /// consulted when `apply_pagination` is set; count operations
    /// suppress it.
    fn apply_filters(
        &self,
        mut scope: SelectScope,
        filters: &[Filter],
        apply_pagination: bool,
    ) -> SelectScope {
        for filter in filters {
            match filter {
                Filter::Page { limit, offset } => {
                    if apply_pagination {
                        scope = scope.paginate(*limit, *offset);
                    }
                }
                Filter::Range {
                    field,
                    lower,
                    upper,
                } => {
                    if let Some(upper) = upper {
                        scope = scope.where_lt(field.clone(), upper.clone());
                    }
                    if let Some(lower) = lower {
                        scope = scope.where_gt(field.clone(), lower.clone());
                    }
                }
                Filter::Membership { field, values } => {
                    // an empty set matches everything, not nothing
                    if !values.is_empty() {
                        scope = scope.where_in(field.clone(), values.clone());
                    }
                }
            }
        }
        scope
    }
}

/// Execute a trivial probe statement through `session` and report
/// whether it produced the expected sentinel value. Independent of any
/// record type; intended for process liveness checks.
pub async fn check_health(
    session: &mut dyn Session,
    query: Option<&str>,
) -> RepositoryResult<bool> {
    let query = query.unwrap_or(HEALTH_CHECK_QUERY);
    Ok(session.probe(query).await? == 1)
}

fn detach(session: &mut dyn Session, table: &str, row: &RecordValues) {
    if let Some(id) = row.get(ID).and_then(Value::as_uuid) {
        session.expunge(table, id);
    }
}

fn describe_eq(eq: EqFilters<'_>) -> String {
    eq.iter()
        .map(|(field, value)| format!("{field}={value:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}
