//! Application startup and lifecycle management.

use crate::config::UtilityConfig;
use crate::handlers::{analytics, bills, health, usage};
use crate::services::{
    init_metrics, Clock, Ledger, LedgerStore, MemoryLedgerStore, PgLedgerStore, SystemClock,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: UtilityConfig,
    pub ledger: Ledger,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    ///
    /// Connects to PostgreSQL and applies migrations when a database is
    /// configured, otherwise keeps the ledger in memory.
    pub async fn build(config: UtilityConfig) -> Result<Self, AppError> {
        let store: Arc<dyn LedgerStore> = match &config.database {
            Some(database) => {
                let store = PgLedgerStore::connect(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    AppError::from(e)
                })?;

                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    AppError::from(e)
                })?;

                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, ledger is kept in memory and lost on exit");
                Arc::new(MemoryLedgerStore::new())
            }
        };

        Self::build_with(config, store, Arc::new(SystemClock)).await
    }

    /// Build the application around an existing store and clock.
    pub async fn build_with(
        config: UtilityConfig,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState {
            config: config.clone(),
            ledger: Ledger::new(store, clock),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the HTTP port the application is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let service_name = self.state.config.service_name.clone();
        let router = router(self.state);

        tracing::info!(
            service = %service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route(
            "/bills",
            post(bills::create_bill).get(bills::get_bill_history),
        )
        .route("/bills/active", get(bills::get_active_bill))
        .route(
            "/bills/:bill_id/estimate",
            get(analytics::estimate_remaining_days),
        )
        .route("/bills/:bill_id/trend", get(analytics::get_daily_usage_trend))
        .route("/bills/:bill_id/alert", get(analytics::check_low_balance_alert))
        .route("/bills/:bill_id/monthly", get(analytics::get_monthly_comparison))
        .route(
            "/bills/:bill_id/statistics",
            get(analytics::get_usage_statistics),
        )
        .route(
            "/usage",
            post(usage::record_usage).get(usage::get_usage_history),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
