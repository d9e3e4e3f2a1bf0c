//! Bill lifecycle: purchase, active-bill lookup and history.

use crate::models::{BillWithUsage, CreateBill, NewBill, UsageFilter, UtilityBill};
use crate::services::clock::Clock;
use crate::services::error::LedgerError;
use crate::services::metrics::{record_bill_created, set_active_remaining_units};
use crate::services::store::LedgerStore;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Upper bound for history listings.
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct BillLifecycle {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl BillLifecycle {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Purchase a new bill. Every previously active bill is deactivated in
    /// the same transaction, so afterwards the new bill is the only active one.
    #[instrument(skip(self, input), fields(initial_units = %input.initial_units))]
    pub async fn create_bill(&self, input: &CreateBill) -> Result<UtilityBill, LedgerError> {
        let result = self.purchase(input).await;
        match &result {
            Ok(_) => record_bill_created("ok"),
            Err(e) => record_bill_created(e.kind()),
        }
        result
    }

    async fn purchase(&self, input: &CreateBill) -> Result<UtilityBill, LedgerError> {
        input.validate()?;

        let mut tx = self.store.begin().await?;
        let deactivated = tx.deactivate_active_bills().await?;
        let bill = tx
            .insert_bill(&NewBill {
                initial_units: input.initial_units,
                total_cost_mwk: input.total_cost_mwk,
                start_date: self.clock.now(),
            })
            .await?;
        tx.commit().await?;

        set_active_remaining_units(bill.remaining_units);

        info!(
            bill_id = %bill.bill_id,
            total_cost_mwk = %bill.total_cost_mwk,
            deactivated = deactivated,
            "Utility bill created"
        );

        Ok(bill)
    }

    /// The active bill with its usage records, newest first.
    #[instrument(skip(self))]
    pub async fn active_bill(&self) -> Result<Option<BillWithUsage>, LedgerError> {
        match self.store.find_active_bill().await? {
            Some(bill) => Ok(Some(self.with_usage(bill).await?)),
            None => Ok(None),
        }
    }

    /// Most recently started bills first, each with its usage records.
    /// `limit` is clamped to `1..=MAX_HISTORY_LIMIT`.
    #[instrument(skip(self))]
    pub async fn bill_history(&self, limit: i64) -> Result<Vec<BillWithUsage>, LedgerError> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let bills = self.store.list_bills(limit).await?;

        let mut history = Vec::with_capacity(bills.len());
        for bill in bills {
            history.push(self.with_usage(bill).await?);
        }
        Ok(history)
    }

    async fn with_usage(&self, bill: UtilityBill) -> Result<BillWithUsage, LedgerError> {
        let usage_records = self
            .store
            .list_usage(&UsageFilter::for_bill(bill.bill_id))
            .await?;
        Ok(BillWithUsage {
            bill,
            usage_records,
        })
    }
}
