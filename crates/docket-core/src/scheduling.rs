//! Scheduling strategy: which eligible task a claim receives.
//!
//! The claim algorithm (eligibility, locking, transition) is fixed; only the
//! choice among eligible candidates is pluggable. Every ordering ends with
//! `id ASC` so equal keys resolve deterministically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{BrokerError, Task};

/// Field a claim may order candidates by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    Priority,
    Id,
    Attempts,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        SortField::CreatedAt,
        SortField::Priority,
        SortField::Id,
        SortField::Attempts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Priority => "priority",
            SortField::Id => "id",
            SortField::Attempts => "attempts",
        }
    }

    /// Order used when `sort_order` is omitted: priority runs highest first,
    /// the other fields run oldest / lowest first.
    pub fn default_order(self) -> SortOrder {
        match self {
            SortField::Priority => SortOrder::Desc,
            SortField::CreatedAt | SortField::Id | SortField::Attempts => SortOrder::Asc,
        }
    }

    fn compare(self, a: &Task, b: &Task) -> Ordering {
        match self {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Priority => a.priority.cmp(&b.priority),
            SortField::Id => a.id.cmp(&b.id),
            SortField::Attempts => a.attempts.cmp(&b.attempts),
        }
    }
}

impl FromStr for SortField {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| BrokerError::InvalidSortField(s.to_string()))
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(BrokerError::InvalidSortField(other.to_string())),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(sort_by, sort_order)` of a claim. Default: highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::Priority,
            order: SortOrder::Desc,
        }
    }
}

impl SortSpec {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Parses optional request values. An omitted field is `priority`; an omitted
    /// order is the field's `default_order`. Unknown values are
    /// `InvalidSortField`, never silently defaulted.
    pub fn parse(sort_by: Option<&str>, sort_order: Option<&str>) -> Result<Self, BrokerError> {
        let field = sort_by
            .map(str::parse::<SortField>)
            .transpose()?
            .unwrap_or(SortSpec::default().field);
        let order = sort_order
            .map(str::parse::<SortOrder>)
            .transpose()?
            .unwrap_or_else(|| field.default_order());
        Ok(Self { field, order })
    }
}

/// Picks one task out of the eligible set.
///
/// `sort()` lets a store pre-order and bound the candidate scan the same way
/// `compare` orders them in memory.
pub trait SchedulingStrategy: Send + Sync {
    fn sort(&self) -> SortSpec;

    fn compare(&self, a: &Task, b: &Task) -> Ordering;

    fn select<'a>(&self, candidates: &'a [Task]) -> Option<&'a Task> {
        candidates.iter().min_by(|a, b| self.compare(a, b))
    }
}

/// Orders by a single field, then `id ASC`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldOrdering(pub SortSpec);

impl SchedulingStrategy for FieldOrdering {
    fn sort(&self) -> SortSpec {
        self.0
    }

    fn compare(&self, a: &Task, b: &Task) -> Ordering {
        let SortSpec { field, order } = self.0;
        order
            .apply(field.compare(a, b))
            .then_with(|| a.id.cmp(&b.id))
    }
}
