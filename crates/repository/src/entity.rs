//! # Record Contract
//!
//! The minimal shape a persisted record type must satisfy to be managed
//! by a [`Repository`](crate::repository::Repository).

use common::error::RepositoryResult;
use uuid::Uuid;

use crate::value::RecordValues;

/// Field name under which a record's identifier materializes.
pub const ID: &str = "id";

/// Field name of the creation timestamp.
pub const CREATED: &str = "created";

/// Field name of the last-update timestamp, bumped by the unit of work
/// just before changes are made durable.
pub const UPDATED: &str = "updated";

/// Contract for record types managed by a repository.
///
/// A record carries an opaque, globally unique identifier (assigned at
/// creation when absent) plus `created`/`updated` timestamps maintained
/// by the unit of work. Implementations should treat two records with
/// the same identifier as the same entity.
///
/// `from_values` must tolerate absent fields beyond the generated ones:
/// `get_or_create` builds a record from its equality constraints alone,
/// so every other field needs a sensible default there.
pub trait Record: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Name of the collection (table) holding records of this type.
    const TABLE: &'static str;

    /// The identifier, if one has been assigned yet.
    fn id(&self) -> Option<Uuid>;

    /// Materialize the record as a plain key/value mapping.
    fn to_values(&self) -> RecordValues;

    /// Rebuild a record from a mapping read back from storage.
    fn from_values(values: &RecordValues) -> RepositoryResult<Self>;
}
