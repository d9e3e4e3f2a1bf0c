//! Ledger store boundary.
//!
//! Multi-step writes go through a [`LedgerTransaction`], a handle scoped to
//! one transaction that exposes only the writes the ledger needs. Dropping
//! the handle without calling [`LedgerTransaction::commit`] discards every
//! staged write.

mod memory;
mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use crate::models::{NewBill, NewUsage, UsageAggregate, UsageFilter, UsageRecord, UtilityBill};
use crate::services::error::LedgerError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a write transaction. Concurrent transactions touching the
    /// active bill are serialized.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError>;

    async fn find_active_bill(&self) -> Result<Option<UtilityBill>, LedgerError>;

    async fn find_bill(&self, bill_id: Uuid) -> Result<Option<UtilityBill>, LedgerError>;

    /// Most recently started bills first.
    async fn list_bills(&self, limit: i64) -> Result<Vec<UtilityBill>, LedgerError>;

    async fn list_usage(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, LedgerError>;

    /// Aggregate over the records selected by `filter`; order and limit are ignored.
    async fn aggregate_usage(&self, filter: &UsageFilter) -> Result<UsageAggregate, LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait LedgerTransaction: Send {
    /// Set `is_active = false` on every active bill. Returns the number of bills changed.
    async fn deactivate_active_bills(&mut self) -> Result<u64, LedgerError>;

    /// Insert an active bill with `remaining_units = initial_units`.
    async fn insert_bill(&mut self, input: &NewBill) -> Result<UtilityBill, LedgerError>;

    /// Read the active bill and hold it against other writers until the
    /// transaction ends.
    async fn lock_active_bill(&mut self) -> Result<Option<UtilityBill>, LedgerError>;

    async fn insert_usage(
        &mut self,
        bill_id: Uuid,
        input: &NewUsage,
    ) -> Result<UsageRecord, LedgerError>;

    async fn update_bill_balance(
        &mut self,
        bill_id: Uuid,
        remaining_units: Decimal,
        is_active: bool,
    ) -> Result<UtilityBill, LedgerError>;

    /// Publish every write made through this handle. The handle must not be
    /// used afterwards.
    async fn commit(&mut self) -> Result<(), LedgerError>;
}
