//! Read-only analytics over a bill's usage ledger.

use crate::models::{
    AggregateStats, DailyUsage, LowBalanceAlert, MonthlyComparison, MonthlyUsage,
    RemainingDaysEstimate, UsageFilter, UsageStatistics, UtilityBill,
};
use crate::services::clock::Clock;
use crate::services::error::LedgerError;
use crate::services::store::LedgerStore;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

pub const DEFAULT_TREND_DAYS: u32 = 7;
pub const MAX_TREND_DAYS: u32 = 366;

/// Round to two decimals, halves away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Midnight UTC on the first day of the month containing `at`.
fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(at)
}

#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl AnalyticsEngine {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn require_bill(&self, bill_id: Uuid) -> Result<UtilityBill, LedgerError> {
        self.store
            .find_bill(bill_id)
            .await?
            .ok_or(LedgerError::BillNotFound(bill_id))
    }

    /// Burn rate (units per usage record) and the days it leaves.
    ///
    /// `None` when the bill has no usage yet. The day count is taken from
    /// the unrounded average.
    #[instrument(skip(self))]
    pub async fn estimate_remaining_days(
        &self,
        bill_id: Uuid,
    ) -> Result<Option<RemainingDaysEstimate>, LedgerError> {
        let bill = self.require_bill(bill_id).await?;
        let aggregate = self
            .store
            .aggregate_usage(&UsageFilter::for_bill(bill_id))
            .await?;

        if aggregate.count == 0 {
            return Ok(None);
        }

        let average = aggregate.units.sum / Decimal::from(aggregate.count);
        let estimated_remaining_days = if average > Decimal::ZERO {
            (bill.remaining_units / average).floor().to_i64()
        } else {
            None
        };

        Ok(Some(RemainingDaysEstimate {
            average_daily_usage: round2(average),
            estimated_remaining_days,
        }))
    }

    /// Units and cost per calendar date (UTC) over `[now - days, now]`,
    /// oldest date first. Dates without usage are omitted.
    #[instrument(skip(self))]
    pub async fn daily_usage_trend(
        &self,
        bill_id: Uuid,
        days: u32,
    ) -> Result<Vec<DailyUsage>, LedgerError> {
        if !(1..=MAX_TREND_DAYS).contains(&days) {
            let mut errors = ValidationErrors::new();
            let mut err = ValidationError::new("range");
            err.message = Some(format!("days must be between 1 and {}", MAX_TREND_DAYS).into());
            errors.add("days", err);
            return Err(LedgerError::Validation(errors));
        }

        self.require_bill(bill_id).await?;

        let end = self.clock.now();
        let start = end - Duration::days(i64::from(days));
        let records = self
            .store
            .list_usage(
                &UsageFilter::for_bill(bill_id)
                    .since(start)
                    .until_inclusive(end)
                    .oldest_first(),
            )
            .await?;

        let mut buckets: BTreeMap<NaiveDate, (Decimal, Decimal)> = BTreeMap::new();
        for record in &records {
            let bucket = buckets.entry(record.date.date_naive()).or_default();
            bucket.0 += record.units_used;
            bucket.1 += record.cost_mwk;
        }

        Ok(buckets
            .into_iter()
            .map(|(date, (total_units, total_cost))| DailyUsage {
                date,
                total_units,
                total_cost,
            })
            .collect())
    }

    /// Flag the bill when `remaining_units <= threshold`.
    #[instrument(skip(self))]
    pub async fn check_low_balance(
        &self,
        bill_id: Uuid,
        threshold: Decimal,
    ) -> Result<LowBalanceAlert, LedgerError> {
        let bill = self.require_bill(bill_id).await?;

        let percentage_remaining = if bill.initial_units > Decimal::ZERO {
            round2(bill.remaining_units / bill.initial_units * Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        };

        Ok(LowBalanceAlert {
            is_low: bill.remaining_units <= threshold,
            remaining_units: bill.remaining_units,
            percentage_remaining,
            threshold,
        })
    }

    /// Usage this calendar month (from its first day onwards) against the
    /// whole of last month.
    #[instrument(skip(self))]
    pub async fn monthly_comparison(
        &self,
        bill_id: Uuid,
    ) -> Result<MonthlyComparison, LedgerError> {
        self.require_bill(bill_id).await?;

        let current_start = month_start(self.clock.now());
        let last_start = current_start
            .checked_sub_months(Months::new(1))
            .unwrap_or(current_start);

        let current = self
            .store
            .aggregate_usage(&UsageFilter::for_bill(bill_id).since(current_start))
            .await?;
        let last = self
            .store
            .aggregate_usage(
                &UsageFilter::for_bill(bill_id)
                    .since(last_start)
                    .before(current_start),
            )
            .await?;

        Ok(MonthlyComparison {
            current_month: MonthlyUsage {
                units: current.units.sum,
                cost: current.cost.sum,
            },
            last_month: MonthlyUsage {
                units: last.units.sum,
                cost: last.cost.sum,
            },
        })
    }

    /// Sum/avg/max/min of units and cost over every record of the bill.
    #[instrument(skip(self))]
    pub async fn usage_statistics(
        &self,
        bill_id: Uuid,
    ) -> Result<UsageStatistics, LedgerError> {
        self.require_bill(bill_id).await?;
        let aggregate = self
            .store
            .aggregate_usage(&UsageFilter::for_bill(bill_id))
            .await?;

        let rounded = |stats: AggregateStats| AggregateStats {
            avg: stats.avg.map(round2),
            ..stats
        };

        Ok(UsageStatistics {
            count: aggregate.count,
            units: rounded(aggregate.units),
            cost: rounded(aggregate.cost),
        })
    }
}
