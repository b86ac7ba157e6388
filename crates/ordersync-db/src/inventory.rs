use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordersync_core::error::AppError;
use ordersync_core::models::{InventoryRecord, NewInventoryRecord};
use ordersync_core::ports::InventoryStore;
use sqlx::{PgPool, Pool, Postgres};

/// Append-only inventory snapshots. The newest row per SKU by `synced_at`
/// is the current stock; every inserted snapshot is mirrored into
/// `inventory_history`.
#[derive(Clone)]
pub struct InventoryRepository {
    pool: Pool<Postgres>,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn latest_for_sku(&self, sku: &str) -> Result<Option<InventoryRecord>, AppError> {
        let row: Option<InventoryRow> = sqlx::query_as(
            r#"
            SELECT sku, current_stock, previous_stock, stock_change, synced_at
            FROM inventory
            WHERE sku = $1
            ORDER BY synced_at DESC
            LIMIT 1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(InventoryRecord::from))
    }

    /// Writes the snapshot and its history entry in one transaction.
    pub async fn insert_snapshot(&self, record: &NewInventoryRecord) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;

        sqlx::query(
            r#"
            INSERT INTO inventory (sku, current_stock, previous_stock, stock_change, synced_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.sku)
        .bind(record.current_stock)
        .bind(record.previous_stock)
        .bind(record.stock_change)
        .bind(record.synced_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::DatabaseError)?;

        sqlx::query(
            r#"
            INSERT INTO inventory_history (
                sku, stock_before, stock_after, stock_change, change_reason, reference_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.sku)
        .bind(record.previous_stock)
        .bind(record.current_stock)
        .bind(record.stock_change)
        .bind(&record.reason)
        .bind(&record.reference_id)
        .bind(record.synced_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::DatabaseError)?;

        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InventoryRepository {
    async fn latest(&self, sku: &str) -> Result<Option<InventoryRecord>, AppError> {
        self.latest_for_sku(sku).await
    }

    async fn insert(&self, record: &NewInventoryRecord) -> Result<(), AppError> {
        self.insert_snapshot(record).await
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    sku: String,
    current_stock: i64,
    previous_stock: i64,
    stock_change: i64,
    synced_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(row: InventoryRow) -> Self {
        Self {
            sku: row.sku,
            current_stock: row.current_stock,
            previous_stock: row.previous_stock,
            stock_change: row.stock_change,
            synced_at: row.synced_at,
        }
    }
}
