//! Ledger error taxonomy.

use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use super::metrics::record_error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("No active utility bill found")]
    NoActiveBill,

    #[error("Insufficient units remaining: requested {requested}, remaining {remaining}")]
    InsufficientUnits {
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Utility bill {0} not found")]
    BillNotFound(Uuid),

    #[error("Persistence error: {0}")]
    Persistence(anyhow::Error),
}

impl LedgerError {
    /// Store-level failure. The cause is logged here so callers can treat
    /// the error as opaque.
    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, context, "Ledger store failure");
        LedgerError::Persistence(anyhow::anyhow!("{}: {}", context, err))
    }

    /// Metric label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NoActiveBill => "no_active_bill",
            Self::InsufficientUnits { .. } => "insufficient_units",
            Self::BillNotFound(_) => "bill_not_found",
            Self::Persistence(_) => "persistence_error",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        record_error(err.kind());
        match err {
            LedgerError::Validation(errors) => AppError::ValidationError(errors),
            LedgerError::NoActiveBill => AppError::Conflict(anyhow::anyhow!("{}", err)),
            LedgerError::InsufficientUnits { .. } => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            LedgerError::BillNotFound(_) => AppError::NotFound(anyhow::anyhow!("{}", err)),
            LedgerError::Persistence(cause) => AppError::DatabaseError(cause),
        }
    }
}
