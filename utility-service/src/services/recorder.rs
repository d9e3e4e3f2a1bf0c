//! Usage recording against the active bill.

use crate::models::{NewUsage, RecordUsage, UsageFilter, UsageReceipt, UsageRecord};
use crate::services::clock::Clock;
use crate::services::error::LedgerError;
use crate::services::lifecycle::MAX_HISTORY_LIMIT;
use crate::services::metrics::{record_usage_operation, set_active_remaining_units};
use crate::services::store::LedgerStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append a usage record to the active bill and decrement its balance.
    ///
    /// The balance check, the insert and the decrement run in one
    /// transaction holding the active bill, so concurrent recordings cannot
    /// overdraw it. A bill whose balance reaches zero is deactivated.
    #[instrument(skip(self, input), fields(units_used = %input.units_used, backdated = input.date.is_some()))]
    pub async fn record_usage(&self, input: &RecordUsage) -> Result<UsageReceipt, LedgerError> {
        let result = self.settle(input).await;
        match &result {
            Ok(_) => record_usage_operation("ok"),
            Err(e) => record_usage_operation(e.kind()),
        }
        result
    }

    async fn settle(&self, input: &RecordUsage) -> Result<UsageReceipt, LedgerError> {
        input.validate()?;
        let date = input.date.unwrap_or_else(|| self.clock.now());

        let mut tx = self.store.begin().await?;
        let bill = tx
            .lock_active_bill()
            .await?
            .ok_or(LedgerError::NoActiveBill)?;

        if input.units_used > bill.remaining_units {
            return Err(LedgerError::InsufficientUnits {
                requested: input.units_used,
                remaining: bill.remaining_units,
            });
        }

        let usage_record = tx
            .insert_usage(
                bill.bill_id,
                &NewUsage {
                    units_used: input.units_used,
                    cost_mwk: input.cost_mwk,
                    notes: input.notes.clone().filter(|n| !n.trim().is_empty()),
                    date,
                },
            )
            .await?;

        let remaining_units = bill.remaining_units - input.units_used;
        let updated_bill = tx
            .update_bill_balance(bill.bill_id, remaining_units, remaining_units > Decimal::ZERO)
            .await?;
        tx.commit().await?;

        set_active_remaining_units(if updated_bill.is_active {
            updated_bill.remaining_units
        } else {
            Decimal::ZERO
        });

        info!(
            bill_id = %updated_bill.bill_id,
            record_id = %usage_record.record_id,
            remaining_units = %updated_bill.remaining_units,
            is_active = updated_bill.is_active,
            "Usage recorded"
        );

        Ok(UsageReceipt {
            usage_record,
            updated_bill,
        })
    }

    /// Latest usage records of the active bill.
    ///
    /// Never fails: with no active bill, or when the store is unreachable,
    /// the history is empty.
    #[instrument(skip(self))]
    pub async fn usage_history(&self, limit: i64) -> Vec<UsageRecord> {
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let history = async {
            match self.store.find_active_bill().await? {
                Some(bill) => {
                    self.store
                        .list_usage(&UsageFilter::for_bill(bill.bill_id).limit(limit))
                        .await
                }
                None => Ok(Vec::new()),
            }
        };

        history.await.unwrap_or_else(|e: LedgerError| {
            warn!(error = %e, "Failed to fetch usage history");
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateBill;
    use crate::services::clock::FixedClock;
    use crate::services::lifecycle::BillLifecycle;
    use crate::services::store::MemoryLedgerStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        store: Arc<MemoryLedgerStore>,
        clock: Arc<FixedClock>,
        lifecycle: BillLifecycle,
        recorder: UsageRecorder,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryLedgerStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap(),
        ));
        Harness {
            lifecycle: BillLifecycle::new(store.clone(), clock.clone()),
            recorder: UsageRecorder::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    fn usage(units: i64, cost: i64) -> RecordUsage {
        RecordUsage {
            units_used: Decimal::from(units),
            cost_mwk: Decimal::from(cost),
            notes: None,
            date: None,
        }
    }

    async fn purchase(h: &Harness, units: i64, cost: i64) {
        h.lifecycle
            .create_bill(&CreateBill {
                initial_units: Decimal::from(units),
                total_cost_mwk: Decimal::from(cost),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bill_is_drawn_down_and_exhausted() {
        let h = harness();
        purchase(&h, 700, 150_000).await;

        let first = h.recorder.record_usage(&usage(50, 10_000)).await.unwrap();
        assert_eq!(first.updated_bill.remaining_units, Decimal::from(650));
        assert!(first.updated_bill.is_active);
        assert_eq!(first.usage_record.date, h.clock.now());

        let second = h.recorder.record_usage(&usage(650, 140_000)).await.unwrap();
        assert_eq!(second.updated_bill.remaining_units, Decimal::ZERO);
        assert!(!second.updated_bill.is_active);

        let third = h.recorder.record_usage(&usage(1, 200)).await;
        assert!(matches!(third, Err(LedgerError::NoActiveBill)));
    }

    #[tokio::test]
    async fn remaining_units_are_conserved() {
        let h = harness();
        purchase(&h, 1_000, 200_000).await;

        let draws = [12, 7, 30, 1, 99, 250];
        for units in draws {
            h.recorder.record_usage(&usage(units, units * 200)).await.unwrap();
            h.clock.advance(Duration::hours(6));
        }

        let active = h.lifecycle.active_bill().await.unwrap().unwrap();
        let drawn: i64 = draws.iter().sum();
        assert_eq!(active.bill.remaining_units, Decimal::from(1_000 - drawn));
        assert_eq!(active.usage_records.len(), draws.len());
        let recorded: Decimal = active.usage_records.iter().map(|r| r.units_used).sum();
        assert_eq!(active.bill.consumed_units(), recorded);
    }

    #[tokio::test]
    async fn overdraw_leaves_ledger_untouched() {
        let h = harness();
        purchase(&h, 100, 20_000).await;
        h.recorder.record_usage(&usage(40, 8_000)).await.unwrap();

        let result = h.recorder.record_usage(&usage(61, 12_200)).await;
        match result {
            Err(LedgerError::InsufficientUnits {
                requested,
                remaining,
            }) => {
                assert_eq!(requested, Decimal::from(61));
                assert_eq!(remaining, Decimal::from(60));
            }
            other => panic!("expected InsufficientUnits, got {:?}", other),
        }

        let active = h.lifecycle.active_bill().await.unwrap().unwrap();
        assert_eq!(active.bill.remaining_units, Decimal::from(60));
        assert!(active.bill.is_active);
        assert_eq!(active.usage_records.len(), 1);
    }

    #[tokio::test]
    async fn usage_without_bill_is_rejected() {
        let h = harness();
        let result = h.recorder.record_usage(&usage(1, 1)).await;
        assert!(matches!(result, Err(LedgerError::NoActiveBill)));
    }

    #[tokio::test]
    async fn invalid_usage_is_rejected_before_store_access() {
        let h = harness();
        h.store.set_unavailable(true);

        // Validation wins over the unreachable store.
        let result = h.recorder.record_usage(&usage(0, 100)).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let long_notes = RecordUsage {
            notes: Some("x".repeat(501)),
            ..usage(5, 100)
        };
        let result = h.recorder.record_usage(&long_notes).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn oversized_amounts_never_reach_the_ledger() {
        let h = harness();
        let huge: Decimal = "50000000000000000000000000000".parse().unwrap();

        let bill = h
            .lifecycle
            .create_bill(&CreateBill {
                initial_units: Decimal::from(10),
                total_cost_mwk: huge,
            })
            .await;
        assert!(matches!(bill, Err(LedgerError::Validation(_))));

        purchase(&h, 10, 2_000).await;
        for _ in 0..2 {
            let result = h
                .recorder
                .record_usage(&RecordUsage {
                    cost_mwk: huge,
                    ..usage(1, 0)
                })
                .await;
            assert!(matches!(result, Err(LedgerError::Validation(_))));
        }

        let too_many_units = h
            .recorder
            .record_usage(&usage(1_000_000_000_000, 100))
            .await;
        assert!(matches!(too_many_units, Err(LedgerError::Validation(_))));

        let active = h.lifecycle.active_bill().await.unwrap().unwrap();
        assert!(active.usage_records.is_empty());
        assert_eq!(active.bill.remaining_units, Decimal::from(10));
    }

    #[tokio::test]
    async fn backdated_usage_keeps_its_date() {
        let h = harness();
        purchase(&h, 300, 60_000).await;

        let past = h.clock.now() - Duration::days(3);
        let receipt = h
            .recorder
            .record_usage(&RecordUsage {
                date: Some(past),
                notes: Some("meter read late".to_string()),
                ..usage(20, 4_000)
            })
            .await
            .unwrap();

        assert_eq!(receipt.usage_record.date, past);
        assert_eq!(receipt.usage_record.notes.as_deref(), Some("meter read late"));
        assert_eq!(receipt.updated_bill.remaining_units, Decimal::from(280));
    }

    #[tokio::test]
    async fn concurrent_recordings_never_overdraw() {
        let h = harness();
        purchase(&h, 100, 20_000).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let recorder = h.recorder.clone();
            handles.push(tokio::spawn(async move {
                recorder.record_usage(&usage(30, 6_000)).await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        // 3 x 30 fits into 100; the fourth would overdraw.
        assert_eq!(accepted, 3);
        let bill = h.store.find_active_bill().await.unwrap().unwrap();
        assert_eq!(bill.remaining_units, Decimal::from(10));
    }

    #[tokio::test]
    async fn usage_history_is_latest_first_and_bounded() {
        let h = harness();
        purchase(&h, 500, 100_000).await;
        for units in 1..=4 {
            h.recorder.record_usage(&usage(units, 100)).await.unwrap();
            h.clock.advance(Duration::days(1));
        }

        let history = h.recorder.usage_history(3).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].units_used, Decimal::from(4));
        assert_eq!(history[2].units_used, Decimal::from(2));
    }

    #[tokio::test]
    async fn usage_history_degrades_to_empty() {
        let h = harness();
        assert!(h.recorder.usage_history(10).await.is_empty());

        purchase(&h, 500, 100_000).await;
        h.recorder.record_usage(&usage(5, 100)).await.unwrap();
        h.store.set_unavailable(true);
        assert!(h.recorder.usage_history(10).await.is_empty());
    }
}
