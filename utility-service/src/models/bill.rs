//! Utility bill model.

use super::usage::UsageRecord;
use super::validation::{validate_non_negative_amount, validate_positive_quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A purchased block of electricity units, tracked until exhausted.
///
/// `initial_units`, `total_cost_mwk` and `start_date` never change after
/// creation. `remaining_units` only decreases, and only through recorded
/// usage. Bills are never deleted, only deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UtilityBill {
    pub bill_id: Uuid,
    pub initial_units: Decimal,
    pub remaining_units: Decimal,
    pub total_cost_mwk: Decimal,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
}

impl UtilityBill {
    /// Units consumed so far.
    pub fn consumed_units(&self) -> Decimal {
        self.initial_units - self.remaining_units
    }
}

/// Bill together with its usage records, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillWithUsage {
    #[serde(flatten)]
    pub bill: UtilityBill,
    pub usage_records: Vec<UsageRecord>,
}

/// Input for purchasing a new bill.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBill {
    #[validate(custom(function = "validate_positive_quantity"))]
    pub initial_units: Decimal,
    #[validate(custom(function = "validate_non_negative_amount"))]
    pub total_cost_mwk: Decimal,
}

/// Row written by the store when a bill is created.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub initial_units: Decimal,
    pub total_cost_mwk: Decimal,
    pub start_date: DateTime<Utc>,
}
