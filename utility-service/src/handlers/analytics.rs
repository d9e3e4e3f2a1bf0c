//! Per-bill analytics handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{AlertQuery, TrendQuery},
    models::{DailyUsage, LowBalanceAlert, MonthlyComparison, RemainingDaysEstimate, UsageStatistics},
    startup::AppState,
};

/// `null` until the bill has at least one usage record.
pub async fn estimate_remaining_days(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<Option<RemainingDaysEstimate>>, AppError> {
    let estimate = state
        .ledger
        .analytics
        .estimate_remaining_days(bill_id)
        .await?;
    Ok(Json(estimate))
}

pub async fn get_daily_usage_trend(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<DailyUsage>>, AppError> {
    let days = query.days.unwrap_or(state.config.ledger.trend_days);
    let trend = state
        .ledger
        .analytics
        .daily_usage_trend(bill_id, days)
        .await?;
    Ok(Json(trend))
}

pub async fn check_low_balance_alert(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<LowBalanceAlert>, AppError> {
    let threshold = query
        .threshold
        .unwrap_or(state.config.ledger.low_balance_threshold);
    let alert = state
        .ledger
        .analytics
        .check_low_balance(bill_id, threshold)
        .await?;
    Ok(Json(alert))
}

pub async fn get_monthly_comparison(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<MonthlyComparison>, AppError> {
    let comparison = state.ledger.analytics.monthly_comparison(bill_id).await?;
    Ok(Json(comparison))
}

pub async fn get_usage_statistics(
    State(state): State<AppState>,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<UsageStatistics>, AppError> {
    let statistics = state.ledger.analytics.usage_statistics(bill_id).await?;
    Ok(Json(statistics))
}
