//! Services module for utility-service.

pub mod analytics;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod recorder;
pub mod store;

pub use analytics::AnalyticsEngine;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::LedgerError;
pub use lifecycle::BillLifecycle;
pub use metrics::{get_metrics, init_metrics};
pub use recorder::UsageRecorder;
pub use store::{LedgerStore, LedgerTransaction, MemoryLedgerStore, PgLedgerStore};

use std::sync::Arc;

/// The ledger's three components over one store and one clock.
#[derive(Clone)]
pub struct Ledger {
    pub lifecycle: BillLifecycle,
    pub recorder: UsageRecorder,
    pub analytics: AnalyticsEngine,
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lifecycle: BillLifecycle::new(store.clone(), clock.clone()),
            recorder: UsageRecorder::new(store.clone(), clock.clone()),
            analytics: AnalyticsEngine::new(store.clone(), clock),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }
}
