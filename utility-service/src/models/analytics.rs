//! Derived views over a bill's usage ledger.

use super::usage::AggregateStats;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Burn-rate projection. `average_daily_usage` is units per usage record,
/// not per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemainingDaysEstimate {
    pub average_daily_usage: Decimal,
    pub estimated_remaining_days: Option<i64>,
}

/// One calendar-date bucket of the usage trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub total_units: Decimal,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowBalanceAlert {
    pub is_low: bool,
    pub remaining_units: Decimal,
    pub percentage_remaining: Decimal,
    pub threshold: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub units: Decimal,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyComparison {
    pub current_month: MonthlyUsage,
    pub last_month: MonthlyUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStatistics {
    pub count: i64,
    pub units: AggregateStats,
    pub cost: AggregateStats,
}
