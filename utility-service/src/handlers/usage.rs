//! Usage recording handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::LimitQuery,
    models::{RecordUsage, UsageReceipt, UsageRecord},
    startup::AppState,
};

/// Record consumption against the active bill.
pub async fn record_usage(
    State(state): State<AppState>,
    Json(payload): Json<RecordUsage>,
) -> Result<(StatusCode, Json<UsageReceipt>), AppError> {
    let receipt = state.ledger.recorder.record_usage(&payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Latest usage records of the active bill. Store failures yield an empty list.
pub async fn get_usage_history(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<UsageRecord>> {
    let limit = query
        .limit
        .unwrap_or(state.config.ledger.usage_history_limit);
    Json(state.ledger.recorder.usage_history(limit).await)
}
