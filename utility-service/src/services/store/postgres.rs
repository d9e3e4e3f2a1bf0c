//! PostgreSQL ledger store.

use super::{LedgerStore, LedgerTransaction};
use crate::models::{
    AggregateStats, NewBill, NewUsage, UsageAggregate, UsageFilter, UsageRecord, UtilityBill,
};
use crate::services::error::LedgerError;
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::ops::Bound;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const BILL_COLUMNS: &str =
    "bill_id, initial_units, remaining_units, total_cost_mwk, is_active, start_date";
const USAGE_COLUMNS: &str =
    "record_id, bill_id, units_used, cost_mwk, usage_date, notes, created_utc";

/// Advisory lock key held by every write transaction for its lifetime.
const LEDGER_WRITE_LOCK: i64 = 0x5554_494c_4954_5931;

/// Postgres-backed store. Write transactions run at READ COMMITTED, hold
/// the ledger advisory lock and lock the active bill row.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "utility-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, LedgerError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::persistence("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::persistence("Migration failed", e))?;
        info!("Database migrations completed");
        Ok(())
    }
}

/// Split an upper bound into the two nullable SQL parameters
/// `(inclusive_end, exclusive_end)`.
fn upper_bounds(until: &Bound<DateTime<Utc>>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match until {
        Bound::Included(end) => (Some(*end), None),
        Bound::Excluded(end) => (None, Some(*end)),
        Bound::Unbounded => (None, None),
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    record_count: i64,
    units_sum: Decimal,
    units_avg: Option<Decimal>,
    units_max: Option<Decimal>,
    units_min: Option<Decimal>,
    cost_sum: Decimal,
    cost_avg: Option<Decimal>,
    cost_max: Option<Decimal>,
    cost_min: Option<Decimal>,
}

impl From<AggregateRow> for UsageAggregate {
    fn from(row: AggregateRow) -> Self {
        Self {
            count: row.record_count,
            units: AggregateStats {
                sum: row.units_sum,
                avg: row.units_avg,
                max: row.units_max,
                min: row.units_min,
            },
            cost: AggregateStats {
                sum: row.cost_sum,
                avg: row.cost_avg,
                max: row.cost_max,
                min: row.cost_min,
            },
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::persistence("Failed to begin transaction", e))?;

        // Writers queue here instead of failing; every statement after the
        // lock sees the previous writer's committed state.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEDGER_WRITE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::persistence("Failed to acquire ledger lock", e))?;

        Ok(Box::new(PgLedgerTransaction { tx: Some(tx) }))
    }

    #[instrument(skip(self))]
    async fn find_active_bill(&self) -> Result<Option<UtilityBill>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_active_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, UtilityBill>(&format!(
            "SELECT {BILL_COLUMNS} FROM utility_bills WHERE is_active LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::persistence("Failed to get active bill", e))?;

        timer.observe_duration();

        Ok(bill)
    }

    #[instrument(skip(self), fields(bill_id = %bill_id))]
    async fn find_bill(&self, bill_id: Uuid) -> Result<Option<UtilityBill>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_bill"])
            .start_timer();

        let bill = sqlx::query_as::<_, UtilityBill>(&format!(
            "SELECT {BILL_COLUMNS} FROM utility_bills WHERE bill_id = $1"
        ))
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::persistence("Failed to get bill", e))?;

        timer.observe_duration();

        Ok(bill)
    }

    #[instrument(skip(self))]
    async fn list_bills(&self, limit: i64) -> Result<Vec<UtilityBill>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bills"])
            .start_timer();

        let bills = sqlx::query_as::<_, UtilityBill>(&format!(
            "SELECT {BILL_COLUMNS} FROM utility_bills ORDER BY start_date DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::persistence("Failed to list bills", e))?;

        timer.observe_duration();

        Ok(bills)
    }

    #[instrument(skip(self, filter), fields(bill_id = %filter.bill_id))]
    async fn list_usage(&self, filter: &UsageFilter) -> Result<Vec<UsageRecord>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_usage"])
            .start_timer();

        let (until_inclusive, until_exclusive) = upper_bounds(&filter.until);
        let direction = filter.order.as_sql();

        let records = sqlx::query_as::<_, UsageRecord>(&format!(
            r#"
            SELECT {USAGE_COLUMNS}
            FROM usage_records
            WHERE bill_id = $1
              AND ($2::timestamptz IS NULL OR usage_date >= $2)
              AND ($3::timestamptz IS NULL OR usage_date <= $3)
              AND ($4::timestamptz IS NULL OR usage_date < $4)
            ORDER BY usage_date {direction}, created_utc {direction}
            LIMIT $5
            "#
        ))
        .bind(filter.bill_id)
        .bind(filter.since)
        .bind(until_inclusive)
        .bind(until_exclusive)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::persistence("Failed to list usage records", e))?;

        timer.observe_duration();

        Ok(records)
    }

    #[instrument(skip(self, filter), fields(bill_id = %filter.bill_id))]
    async fn aggregate_usage(&self, filter: &UsageFilter) -> Result<UsageAggregate, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["aggregate_usage"])
            .start_timer();

        let (until_inclusive, until_exclusive) = upper_bounds(&filter.until);

        let row = sqlx::query_as::<_, AggregateRow>(
            r#"
            SELECT
                COUNT(*) AS record_count,
                COALESCE(SUM(units_used), 0) AS units_sum,
                AVG(units_used) AS units_avg,
                MAX(units_used) AS units_max,
                MIN(units_used) AS units_min,
                COALESCE(SUM(cost_mwk), 0) AS cost_sum,
                AVG(cost_mwk) AS cost_avg,
                MAX(cost_mwk) AS cost_max,
                MIN(cost_mwk) AS cost_min
            FROM usage_records
            WHERE bill_id = $1
              AND ($2::timestamptz IS NULL OR usage_date >= $2)
              AND ($3::timestamptz IS NULL OR usage_date <= $3)
              AND ($4::timestamptz IS NULL OR usage_date < $4)
            "#,
        )
        .bind(filter.bill_id)
        .bind(filter.since)
        .bind(until_inclusive)
        .bind(until_exclusive)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LedgerError::persistence("Failed to aggregate usage", e))?;

        timer.observe_duration();

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::persistence("Health check failed", e))?;
        Ok(())
    }
}

/// Transaction-scoped handle. Dropping it before `commit` rolls back.
struct PgLedgerTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTransaction {
    fn open(&mut self) -> Result<&mut Transaction<'static, Postgres>, LedgerError> {
        self.tx.as_mut().ok_or_else(|| {
            LedgerError::persistence("Transaction closed", "handle used after commit")
        })
    }
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn deactivate_active_bills(&mut self) -> Result<u64, LedgerError> {
        let tx = self.open()?;
        let result = sqlx::query("UPDATE utility_bills SET is_active = FALSE WHERE is_active")
            .execute(&mut **tx)
            .await
            .map_err(|e| LedgerError::persistence("Failed to deactivate bills", e))?;
        Ok(result.rows_affected())
    }

    async fn insert_bill(&mut self, input: &NewBill) -> Result<UtilityBill, LedgerError> {
        let tx = self.open()?;
        let bill_id = Uuid::new_v4();
        let bill = sqlx::query_as::<_, UtilityBill>(&format!(
            r#"
            INSERT INTO utility_bills (bill_id, initial_units, remaining_units, total_cost_mwk, is_active, start_date)
            VALUES ($1, $2, $2, $3, TRUE, $4)
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(bill_id)
        .bind(input.initial_units)
        .bind(input.total_cost_mwk)
        .bind(input.start_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| LedgerError::persistence("Failed to create bill", e))?;
        Ok(bill)
    }

    async fn lock_active_bill(&mut self) -> Result<Option<UtilityBill>, LedgerError> {
        let tx = self.open()?;
        let bill = sqlx::query_as::<_, UtilityBill>(&format!(
            "SELECT {BILL_COLUMNS} FROM utility_bills WHERE is_active LIMIT 1 FOR UPDATE"
        ))
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| LedgerError::persistence("Failed to lock active bill", e))?;
        Ok(bill)
    }

    async fn insert_usage(
        &mut self,
        bill_id: Uuid,
        input: &NewUsage,
    ) -> Result<UsageRecord, LedgerError> {
        let tx = self.open()?;
        let record_id = Uuid::new_v4();
        let record = sqlx::query_as::<_, UsageRecord>(&format!(
            r#"
            INSERT INTO usage_records (record_id, bill_id, units_used, cost_mwk, usage_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USAGE_COLUMNS}
            "#
        ))
        .bind(record_id)
        .bind(bill_id)
        .bind(input.units_used)
        .bind(input.cost_mwk)
        .bind(input.date)
        .bind(&input.notes)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| LedgerError::persistence("Failed to record usage", e))?;
        Ok(record)
    }

    async fn update_bill_balance(
        &mut self,
        bill_id: Uuid,
        remaining_units: Decimal,
        is_active: bool,
    ) -> Result<UtilityBill, LedgerError> {
        let tx = self.open()?;
        let bill = sqlx::query_as::<_, UtilityBill>(&format!(
            r#"
            UPDATE utility_bills
            SET remaining_units = $2, is_active = $3
            WHERE bill_id = $1
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(bill_id)
        .bind(remaining_units)
        .bind(is_active)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| LedgerError::persistence("Failed to update bill", e))?;
        bill.ok_or(LedgerError::BillNotFound(bill_id))
    }

    async fn commit(&mut self) -> Result<(), LedgerError> {
        let tx = self.tx.take().ok_or_else(|| {
            LedgerError::persistence("Failed to commit transaction", "already committed")
        })?;
        tx.commit()
            .await
            .map_err(|e| LedgerError::persistence("Failed to commit transaction", e))
    }
}
