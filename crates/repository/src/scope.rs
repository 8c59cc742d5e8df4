//! # Query Scopes
//!
//! A [`SelectScope`] is the base selection every repository operation
//! starts from and refines: which collection, which predicates, optional
//! ordering and pagination. Scopes are plain values; refinement methods
//! consume and return the scope so custom base scopes stay cheap to
//! compose.

use crate::value::Value;

/// A single predicate over one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq { field: String, value: Value },
    Lt { field: String, value: Value },
    Gt { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Eq { field, .. }
            | Predicate::Lt { field, .. }
            | Predicate::Gt { field, .. }
            | Predicate::In { field, .. } => field,
        }
    }
}

/// The base selection a repository operation refines.
#[derive(Debug, Clone)]
pub struct SelectScope {
    table: String,
    predicates: Vec<Predicate>,
    order_by: Option<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectScope {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            predicates: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Ordering as `(field, ascending)`, if set.
    pub fn order(&self) -> Option<(&str, bool)> {
        self.order_by
            .as_ref()
            .map(|(field, ascending)| (field.as_str(), *ascending))
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Lt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate::Gt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn where_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::In {
            field: field.into(),
            values,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some((field.into(), ascending));
        self
    }

    /// Set the pagination window. A later call overwrites an earlier one.
    pub fn paginate(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}
