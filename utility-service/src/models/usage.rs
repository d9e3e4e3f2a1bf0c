//! Usage record model.

use super::bill::UtilityBill;
use super::validation::{validate_non_negative_amount, validate_positive_quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::ops::Bound;
use uuid::Uuid;
use validator::Validate;

/// A single consumption event against a bill's balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub record_id: Uuid,
    pub bill_id: Uuid,
    pub units_used: Decimal,
    pub cost_mwk: Decimal,
    #[sqlx(rename = "usage_date")]
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording usage against the active bill.
///
/// `date` is `None` for live entry (the clock's "now") and set for
/// backdated entry. Both paths validate and settle identically.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordUsage {
    #[validate(custom(function = "validate_positive_quantity"))]
    pub units_used: Decimal,
    #[validate(custom(function = "validate_non_negative_amount"))]
    pub cost_mwk: Decimal,
    #[validate(length(max = 500, message = "Notes must be at most 500 characters"))]
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Row written by the store when usage is recorded.
#[derive(Debug, Clone)]
pub struct NewUsage {
    pub units_used: Decimal,
    pub cost_mwk: Decimal,
    pub notes: Option<String>,
    pub date: DateTime<Utc>,
}

/// Result of a successful usage recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReceipt {
    pub usage_record: UsageRecord,
    pub updated_bill: UtilityBill,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NewestFirst => "DESC",
            Self::OldestFirst => "ASC",
        }
    }
}

/// Selection of one bill's usage records by date.
#[derive(Debug, Clone)]
pub struct UsageFilter {
    pub bill_id: Uuid,
    /// Inclusive lower bound on `date`.
    pub since: Option<DateTime<Utc>>,
    pub until: Bound<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: Option<i64>,
}

impl UsageFilter {
    /// Every record of the bill, newest first.
    pub fn for_bill(bill_id: Uuid) -> Self {
        Self {
            bill_id,
            since: None,
            until: Bound::Unbounded,
            order: SortOrder::NewestFirst,
            limit: None,
        }
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.since = Some(start);
        self
    }

    pub fn until_inclusive(mut self, end: DateTime<Utc>) -> Self {
        self.until = Bound::Included(end);
        self
    }

    pub fn before(mut self, end: DateTime<Utc>) -> Self {
        self.until = Bound::Excluded(end);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `date` falls inside the filter's window.
    pub fn matches_date(&self, date: DateTime<Utc>) -> bool {
        if self.since.is_some_and(|start| date < start) {
            return false;
        }
        match self.until {
            Bound::Included(end) => date <= end,
            Bound::Excluded(end) => date < end,
            Bound::Unbounded => true,
        }
    }
}

/// Sum/avg/max/min over one column. `sum` is zero for an empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub sum: Decimal,
    pub avg: Option<Decimal>,
    pub max: Option<Decimal>,
    pub min: Option<Decimal>,
}

impl AggregateStats {
    /// Fold a column of values. Used by stores without SQL aggregates.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Decimal>,
    {
        let mut stats = Self::default();
        let mut count = 0u32;
        for value in values {
            count += 1;
            stats.sum += value;
            stats.max = Some(stats.max.map_or(value, |m| m.max(value)));
            stats.min = Some(stats.min.map_or(value, |m| m.min(value)));
        }
        if count > 0 {
            stats.avg = Some(stats.sum / Decimal::from(count));
        }
        stats
    }
}

/// Aggregate projection over a set of usage records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageAggregate {
    pub count: i64,
    pub units: AggregateStats,
    pub cost: AggregateStats,
}
