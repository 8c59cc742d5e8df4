//! # Unit-of-Work Boundary
//!
//! The repository never talks to a storage engine directly; it borrows a
//! [`Session`] — the caller-owned unit of work — for the duration of each
//! call. The session owns attachment and flush timing; the repository
//! never commits, rolls back or closes it.
//!
//! A session is not safe to share across concurrent callers. Operations
//! against the same session execute strictly in call order.
//!
//! Failures cross this boundary as [`SessionError`], the backend-native
//! error surface. The `From<SessionError>` conversion into
//! [`RepositoryError`] is the translation boundary every repository
//! operation routes through via `?`: a constraint violation becomes
//! `Conflict`, anything else becomes `Storage`, and no engine error type
//! ever appears in a public repository signature.

use async_trait::async_trait;
use chrono::Utc;
use common::error::RepositoryError;
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{CREATED, ID, UPDATED};
use crate::scope::SelectScope;
use crate::value::{RecordValues, Value};

/// Backend capability flags for combined mutate-and-return statements.
///
/// These are immutable per-connection facts: read once per call, never
/// changing while a call executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Bulk insert can return the inserted rows in the same round trip.
    pub insert_returning: bool,
    /// Bulk update can return the updated rows in the same round trip.
    pub update_returning: bool,
    /// Bulk delete can return the deleted rows in the same round trip.
    pub delete_returning: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        insert_returning: true,
        update_returning: true,
        delete_returning: true,
    };

    pub const NONE: Capabilities = Capabilities {
        insert_returning: false,
        update_returning: false,
        delete_returning: false,
    };
}

/// Backend-native failure surface of a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A uniqueness or other constraint was violated.
    #[error("constraint violated: {constraint}")]
    ConstraintViolation { constraint: String },

    /// Any other engine failure.
    #[error("{message}")]
    Backend { message: String },
}

impl SessionError {
    pub fn constraint(constraint: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            constraint: constraint.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The exception translation boundary.
impl From<SessionError> for RepositoryError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::ConstraintViolation { constraint } => {
                RepositoryError::conflict(constraint)
            }
            SessionError::Backend { message } => RepositoryError::storage(message),
        }
    }
}

/// Result alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// A caller-owned unit of work over some storage engine.
///
/// Reads (`select`, `count`, ...) return plain mappings that are never
/// attached, so results are detached by construction. Writes are queued
/// into the unit of work (`add`, `merge`, `delete`) and made durable by
/// `flush`, which is also where generated timestamps are stamped:
/// `created`/`updated` on new rows, and `updated` bumped on every merged
/// row just before it is written.
///
/// A failed `flush` leaves the unit of work unusable; the caller should
/// dispose of it (for transactional backends, roll back).
#[async_trait]
pub trait Session: Send {
    /// The connection's capability flags.
    fn capabilities(&self) -> Capabilities;

    /// Execute the scope and return all matching rows.
    async fn select(&mut self, scope: &SelectScope) -> SessionResult<Vec<RecordValues>>;

    /// Execute the scope and pair every returned row with the total count
    /// of the unpaginated matching set, in a single round trip (a
    /// windowed count: identical across all rows of the result).
    async fn select_with_total(
        &mut self,
        scope: &SelectScope,
    ) -> SessionResult<Vec<(RecordValues, u64)>>;

    /// Count the rows matching the scope's predicates. The scope carries
    /// no pagination when the repository builds it for a count.
    async fn count(&mut self, scope: &SelectScope) -> SessionResult<u64>;

    /// Queue a new row into the unit of work and attach it, assigning the
    /// identifier client-side when absent (the engine's column-default
    /// equivalent). Returns the row's identifier.
    fn add(&mut self, table: &str, values: RecordValues) -> Uuid;

    /// Merge-or-insert attachment: queue an update when the identifier is
    /// known to the collection, an insert otherwise. Returns the merged
    /// row as attached.
    async fn merge(&mut self, table: &str, values: RecordValues) -> SessionResult<RecordValues>;

    /// Queue a delete of the identified row.
    fn delete(&mut self, table: &str, id: Uuid);

    /// Execute the queued mutations in order, stamping generated
    /// timestamps.
    async fn flush(&mut self) -> SessionResult<()>;

    /// Re-read the identified row's durable state post-flush.
    async fn refresh(&mut self, table: &str, id: Uuid) -> SessionResult<RecordValues>;

    /// Detach the identified row from unit-of-work tracking.
    fn expunge(&mut self, table: &str, id: Uuid);

    /// Bulk insert in one statement. With `returning` (legal only when
    /// the capability flag is set) the inserted rows come back in the
    /// same round trip. Bypasses the pending journal.
    async fn insert_many(
        &mut self,
        table: &str,
        rows: Vec<RecordValues>,
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>>;

    /// Bulk update by identifier, optionally returning the updated rows.
    async fn update_many(
        &mut self,
        table: &str,
        rows: Vec<RecordValues>,
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>>;

    /// Bulk delete by identifier, optionally returning the deleted rows.
    async fn delete_many(
        &mut self,
        table: &str,
        ids: &[Uuid],
        returning: bool,
    ) -> SessionResult<Option<Vec<RecordValues>>>;

    /// Execute a trivial probe statement and return its scalar result.
    async fn probe(&mut self, query: &str) -> SessionResult<i64>;
}

/// Assign an identifier if the row does not carry one yet.
pub(crate) fn ensure_id(values: &mut RecordValues) -> Uuid {
    if let Some(id) = values.get(ID).and_then(Value::as_uuid) {
        return id;
    }
    let id = Uuid::new_v4();
    values.insert(ID, id);
    id
}

/// Stamp creation/update timestamps on a row about to be inserted.
pub(crate) fn stamp_insert(values: &mut RecordValues) {
    let now = Utc::now();
    if values.get(CREATED).map_or(true, Value::is_null) {
        values.insert(CREATED, now);
    }
    if values.get(UPDATED).map_or(true, Value::is_null) {
        values.insert(UPDATED, now);
    }
}
