//! Bill purchase and lookup handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::LimitQuery,
    models::{BillWithUsage, CreateBill, UtilityBill},
    startup::AppState,
};

/// Purchase a new bill, replacing the active one.
pub async fn create_bill(
    State(state): State<AppState>,
    Json(payload): Json<CreateBill>,
) -> Result<(StatusCode, Json<UtilityBill>), AppError> {
    let bill = state.ledger.lifecycle.create_bill(&payload).await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

/// The active bill with its usage, or `null` when none is active.
pub async fn get_active_bill(
    State(state): State<AppState>,
) -> Result<Json<Option<BillWithUsage>>, AppError> {
    let bill = state.ledger.lifecycle.active_bill().await?;
    Ok(Json(bill))
}

pub async fn get_bill_history(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<BillWithUsage>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(state.config.ledger.bill_history_limit);
    let history = state.ledger.lifecycle.bill_history(limit).await?;
    Ok(Json(history))
}
