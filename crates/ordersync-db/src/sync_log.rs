use ordersync_core::error::AppError;
use ordersync_core::sync::SyncReport;
use sqlx::{PgPool, Pool, Postgres};

/// One row of `order_sync_logs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogEntry {
    pub sync_type: String,
    pub status: String,
    pub orders_synced: i32,
    pub orders_failed: i32,
    pub duration_ms: i64,
    pub error: Option<String>,
}

impl SyncLogEntry {
    /// Entry for a run that completed, fully or partially.
    pub fn completed(channel: &str, report: &SyncReport) -> Self {
        Self {
            sync_type: format!("{}_orders", channel),
            status: report.status_label().to_string(),
            orders_synced: saturate(report.orders_synced),
            orders_failed: saturate(report.orders_skipped),
            duration_ms: i64::try_from(report.duration_ms).unwrap_or(i64::MAX),
            error: None,
        }
    }

    /// Entry for a run that ended before processing any line.
    pub fn failed(channel: &str, error: &AppError, duration_ms: u64) -> Self {
        Self {
            sync_type: format!("{}_orders", channel),
            status: "failed".to_string(),
            orders_synced: 0,
            orders_failed: 0,
            duration_ms: i64::try_from(duration_ms).unwrap_or(i64::MAX),
            error: Some(error.to_string()),
        }
    }
}

fn saturate(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Audit trail of sync runs.
#[derive(Clone)]
pub struct SyncLogRepository {
    pool: Pool<Postgres>,
}

impl SyncLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: &SyncLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO order_sync_logs (
                sync_type, status, orders_synced, orders_failed, duration_ms, error
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.sync_type)
        .bind(&entry.status)
        .bind(entry.orders_synced)
        .bind(entry.orders_failed)
        .bind(entry.duration_ms)
        .bind(&entry.error)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}
