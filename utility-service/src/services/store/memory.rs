//! In-process ledger store.
//!
//! Every transaction holds the single state lock for its whole lifetime and
//! works on a private copy, so transactions are fully serialized and a
//! dropped transaction leaves no trace.

use super::{LedgerStore, LedgerTransaction};
use crate::models::{
    AggregateStats, NewBill, NewUsage, SortOrder, UsageAggregate, UsageFilter, UsageRecord,
    UtilityBill,
};
use crate::services::error::LedgerError;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    bills: Vec<UtilityBill>,
    usage: Vec<UsageRecord>,
}

impl MemoryState {
    fn select_usage(&self, filter: &UsageFilter) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> = self
            .usage
            .iter()
            .filter(|r| r.bill_id == filter.bill_id && filter.matches_date(r.date))
            .cloned()
            .collect();

        records.sort_by(|a, b| (a.date, a.created_utc).cmp(&(b.date, b.created_utc)));
        if filter.order == SortOrder::NewestFirst {
            records.reverse();
        }
        if let Some(limit) = filter.limit {
            records.truncate(limit.max(0) as usize);
        }
        records
    }
}

/// Ledger store kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a persistence error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self, operation: &str) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::persistence(operation, "store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        self.ensure_available("Failed to begin transaction")?;
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            staged,
        }))
    }

    async fn find_active_bill(&self) -> Result<Option<UtilityBill>, LedgerError> {
        self.ensure_available("Failed to get active bill")?;
        let state = self.state.lock().await;
        Ok(state.bills.iter().find(|b| b.is_active).cloned())
    }

    async fn find_bill(&self, bill_id: Uuid) -> Result<Option<UtilityBill>, LedgerError> {
        self.ensure_available("Failed to get bill")?;
        let state = self.state.lock().await;
        Ok(state.bills.iter().find(|b| b.bill_id == bill_id).cloned())
    }

    async fn list_bills(&self, limit: i64) -> Result<Vec<UtilityBill>, LedgerError> {
        self.ensure_available("Failed to list bills")?;
        let state = self.state.lock().await;
        let mut bills = state.bills.clone();
        bills.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        bills.truncate(limit.max(0) as usize);
        Ok(bills)
    }

    async fn list_usage(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, LedgerError> {
        self.ensure_available("Failed to list usage records")?;
        let state = self.state.lock().await;
        Ok(state.select_usage(filter))
    }

    async fn aggregate_usage(&self, filter: &UsageFilter) -> Result<UsageAggregate, LedgerError> {
        self.ensure_available("Failed to aggregate usage")?;
        let state = self.state.lock().await;
        let records = state.select_usage(&UsageFilter {
            limit: None,
            ..filter.clone()
        });

        Ok(UsageAggregate {
            count: records.len() as i64,
            units: AggregateStats::from_values(records.iter().map(|r| r.units_used)),
            cost: AggregateStats::from_values(records.iter().map(|r| r.cost_mwk)),
        })
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        self.ensure_available("Health check failed")
    }
}

struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.guard.is_none() {
            return Err(LedgerError::persistence(
                "Transaction closed",
                "handle used after commit",
            ));
        }
        Ok(())
    }

    fn bill_mut(&mut self, bill_id: Uuid) -> Option<&mut UtilityBill> {
        self.staged.bills.iter_mut().find(|b| b.bill_id == bill_id)
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn deactivate_active_bills(&mut self) -> Result<u64, LedgerError> {
        self.ensure_open()?;
        let mut changed = 0;
        for bill in self.staged.bills.iter_mut().filter(|b| b.is_active) {
            bill.is_active = false;
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_bill(&mut self, input: &NewBill) -> Result<UtilityBill, LedgerError> {
        self.ensure_open()?;
        if self.staged.bills.iter().any(|b| b.is_active) {
            return Err(LedgerError::persistence(
                "Failed to create bill",
                "another bill is already active",
            ));
        }

        let bill = UtilityBill {
            bill_id: Uuid::new_v4(),
            initial_units: input.initial_units,
            remaining_units: input.initial_units,
            total_cost_mwk: input.total_cost_mwk,
            is_active: true,
            start_date: input.start_date,
        };
        self.staged.bills.push(bill.clone());
        Ok(bill)
    }

    async fn lock_active_bill(&mut self) -> Result<Option<UtilityBill>, LedgerError> {
        self.ensure_open()?;
        Ok(self.staged.bills.iter().find(|b| b.is_active).cloned())
    }

    async fn insert_usage(
        &mut self,
        bill_id: Uuid,
        input: &NewUsage,
    ) -> Result<UsageRecord, LedgerError> {
        self.ensure_open()?;
        if self.bill_mut(bill_id).is_none() {
            return Err(LedgerError::persistence(
                "Failed to record usage",
                format!("bill {} does not exist", bill_id),
            ));
        }

        let record = UsageRecord {
            record_id: Uuid::new_v4(),
            bill_id,
            units_used: input.units_used,
            cost_mwk: input.cost_mwk,
            date: input.date,
            notes: input.notes.clone(),
            created_utc: Utc::now(),
        };
        self.staged.usage.push(record.clone());
        Ok(record)
    }

    async fn update_bill_balance(
        &mut self,
        bill_id: Uuid,
        remaining_units: Decimal,
        is_active: bool,
    ) -> Result<UtilityBill, LedgerError> {
        self.ensure_open()?;
        if remaining_units < Decimal::ZERO {
            return Err(LedgerError::persistence(
                "Failed to update bill",
                "remaining units would become negative",
            ));
        }

        let bill = self
            .bill_mut(bill_id)
            .ok_or(LedgerError::BillNotFound(bill_id))?;
        bill.remaining_units = remaining_units;
        bill.is_active = is_active;
        Ok(bill.clone())
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        let mut guard = self.guard.take().ok_or_else(|| {
            LedgerError::persistence("Failed to commit transaction", "already committed")
        })?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_bill(units: i64) -> NewBill {
        NewBill {
            initial_units: Decimal::from(units),
            total_cost_mwk: Decimal::from(units * 200),
            start_date: Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryLedgerStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_bill(&new_bill(100)).await.unwrap();
        }

        assert!(store.find_active_bill().await.unwrap().is_none());
        assert!(store.list_bills(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryLedgerStore::new();

        let mut tx = store.begin().await.unwrap();
        let bill = tx.insert_bill(&new_bill(100)).await.unwrap();
        tx.commit().await.unwrap();

        let active = store.find_active_bill().await.unwrap().unwrap();
        assert_eq!(active.bill_id, bill.bill_id);
        assert_eq!(active.remaining_units, Decimal::from(100));
    }

    #[tokio::test]
    async fn second_active_bill_is_rejected() {
        let store = MemoryLedgerStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_bill(&new_bill(100)).await.unwrap();
        let result = tx.insert_bill(&new_bill(50)).await;
        assert!(matches!(result, Err(LedgerError::Persistence(_))));
    }

    #[tokio::test]
    async fn commit_twice_fails() {
        let store = MemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(tx.lock_active_bill().await.is_err());
    }

    #[tokio::test]
    async fn usage_listing_orders_and_limits() {
        let store = MemoryLedgerStore::new();
        let base = Utc.with_ymd_and_hms(2025, 5, 2, 9, 0, 0).unwrap();

        let mut tx = store.begin().await.unwrap();
        let bill = tx.insert_bill(&new_bill(100)).await.unwrap();
        for day in [2, 0, 1] {
            tx.insert_usage(
                bill.bill_id,
                &NewUsage {
                    units_used: Decimal::from(day + 1),
                    cost_mwk: Decimal::from(100),
                    notes: None,
                    date: base + Duration::days(day),
                },
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let newest = store
            .list_usage(&UsageFilter::for_bill(bill.bill_id).limit(2))
            .await
            .unwrap();
        assert_eq!(newest.len(), 2);
        assert_eq!(newest[0].date, base + Duration::days(2));
        assert_eq!(newest[1].date, base + Duration::days(1));

        let oldest = store
            .list_usage(&UsageFilter::for_bill(bill.bill_id).oldest_first())
            .await
            .unwrap();
        assert_eq!(oldest[0].date, base);

        let aggregate = store
            .aggregate_usage(&UsageFilter::for_bill(bill.bill_id).limit(1))
            .await
            .unwrap();
        assert_eq!(aggregate.count, 3);
        assert_eq!(aggregate.units.sum, Decimal::from(6));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryLedgerStore::new();
        store.set_unavailable(true);

        assert!(store.health_check().await.is_err());
        assert!(store.find_active_bill().await.is_err());
        assert!(store.begin().await.is_err());

        store.set_unavailable(false);
        assert!(store.health_check().await.is_ok());
    }
}
