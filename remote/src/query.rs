// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Query descriptions for block fetches.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::{FieldValue, Record};

/// Filter applied to records of one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    /// Matches every record.
    All,
    /// Field equals the value.
    Equals {
        /// Field name.
        field: String,
        /// Value to compare against.
        value: FieldValue,
    },
    /// Field is strictly less than the value.
    LessThan {
        /// Field name.
        field: String,
        /// Exclusive upper bound.
        value: FieldValue,
    },
    /// Field is strictly greater than the value.
    GreaterThan {
        /// Field name.
        field: String,
        /// Exclusive lower bound.
        value: FieldValue,
    },
    /// All inner predicates match.
    And {
        /// Inner predicates.
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    /// `field == value`.
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field < value`.
    pub fn less_than(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::LessThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field > value`.
    pub fn greater_than(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::GreaterThan {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction, flattening `All`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, p) | (p, Self::All) => p,
            (Self::And { mut predicates }, p) => {
                predicates.push(p);
                Self::And { predicates }
            }
            (a, b) => Self::And {
                predicates: vec![a, b],
            },
        }
    }

    /// Evaluates the predicate against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let cmp = |field: &str, value: &FieldValue| {
            record.field(field).and_then(|f| f.compare(value))
        };

        match self {
            Self::All => true,
            Self::Equals { field, value } => cmp(field, value) == Some(Ordering::Equal),
            Self::LessThan { field, value } => cmp(field, value) == Some(Ordering::Less),
            Self::GreaterThan { field, value } => cmp(field, value) == Some(Ordering::Greater),
            Self::And { predicates } => predicates.iter().all(|p| p.matches(record)),
        }
    }
}

/// Sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Field name.
    pub field: String,
    /// Ascending if true.
    pub ascending: bool,
}

impl SortDescriptor {
    /// Ascending sort on a field.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    /// Descending sort on a field.
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    /// Compares two records by this key. Missing fields sort last.
    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = match (a.field(&self.field), b.field(&self.field)) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.ascending { ord } else { ord.reverse() }
    }
}

/// Scheduling hint passed to the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryPriority {
    /// The user is waiting for the result.
    UserInitiated,
    /// Regular work.
    #[default]
    Utility,
    /// Deferrable background work.
    Background,
}

/// A block-fetch query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Record type to search.
    pub record_type: String,
    /// Filter.
    pub predicate: Predicate,
    /// Sort keys, most significant first.
    #[serde(default)]
    pub sort: Vec<SortDescriptor>,
    /// Maximum number of records to return in total.
    pub results_limit: usize,
    /// Fields to return; all fields when `None`.
    #[serde(default)]
    pub desired_fields: Option<Vec<String>>,
    /// Scheduling hint.
    #[serde(default)]
    pub priority: QueryPriority,
}

impl Query {
    /// Creates a query matching every record of a type.
    pub fn new(record_type: impl Into<String>, results_limit: usize) -> Self {
        Self {
            record_type: record_type.into(),
            predicate: Predicate::All,
            sort: Vec::new(),
            results_limit,
            desired_fields: None,
            priority: QueryPriority::default(),
        }
    }

    /// Sets the predicate.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort_by(mut self, sort: SortDescriptor) -> Self {
        self.sort.push(sort);
        self
    }

    /// Restricts the returned fields.
    #[must_use]
    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.desired_fields = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    /// Sets the scheduling hint.
    #[must_use]
    pub const fn priority(mut self, priority: QueryPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether a record satisfies type and predicate.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        record.record_type() == self.record_type && self.predicate.matches(record)
    }

    /// Orders records according to the sort keys.
    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.sort
            .iter()
            .map(|s| s.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Opaque continuation of a paged query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryCursor(String);

impl QueryCursor {
    /// Creates a cursor from the server's opaque value.
    #[must_use]
    pub const fn new(cursor: String) -> Self {
        Self(cursor)
    }

    /// Returns the inner value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    /// Matching records of this page.
    pub records: Vec<Record>,
    /// Continuation when more records match.
    pub cursor: Option<QueryCursor>,
}
