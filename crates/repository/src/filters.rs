//! # Collection Filters
//!
//! Immutable descriptors of a filtering intent. Filters are stateless,
//! reusable and composable; the repository applies them in caller order,
//! with pagination always taking effect last (and never for counts).

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A composable filter over a record collection.
///
/// The set of variants is closed on purpose: the application routine
/// matches exhaustively, so adding a kind is a compile-checked change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Records whose `field` lies strictly between the bounds, where a
    /// bound is present.
    Range {
        field: String,
        lower: Option<Value>,
        upper: Option<Value>,
    },
    /// Records whose `field` value is in a finite set. An empty set is a
    /// no-op: absent filter input must not read as an exclusionary
    /// filter.
    Membership { field: String, values: Vec<Value> },
    /// Restrict result cardinality and start position.
    Page { limit: u64, offset: u64 },
}

impl Filter {
    pub fn range(
        field: impl Into<String>,
        lower: Option<Value>,
        upper: Option<Value>,
    ) -> Self {
        Self::Range {
            field: field.into(),
            lower,
            upper,
        }
    }

    pub fn membership(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Membership {
            field: field.into(),
            values,
        }
    }

    pub fn page(limit: u64, offset: u64) -> Self {
        Self::Page { limit, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let filter = Filter::range("created", None, Some(Value::Int(10)));
        assert_eq!(
            filter,
            Filter::Range {
                field: "created".to_string(),
                lower: None,
                upper: Some(Value::Int(10)),
            }
        );

        let filter = Filter::membership("status", vec![]);
        assert!(matches!(filter, Filter::Membership { values, .. } if values.is_empty()));

        assert_eq!(
            Filter::page(25, 50),
            Filter::Page {
                limit: 25,
                offset: 50
            }
        );
    }
}
