//! Query-string parameters for the ledger endpoints.
//!
//! Every field is optional; the configured defaults in
//! [`LedgerSettings`](crate::config::LedgerSettings) fill the gaps.

use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrendQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub threshold: Option<Decimal>,
}
