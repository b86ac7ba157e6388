use async_trait::async_trait;
use ordersync_core::error::AppError;
use ordersync_core::models::SkuResolutionTable;
use ordersync_core::ports::SkuSource;
use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;

/// Loads the (product_no, variant_code) → SKU join table from the channel's
/// product catalog mirror.
#[derive(Clone)]
pub struct SkuRepository {
    pool: Pool<Postgres>,
}

impl SkuRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Variants without a SKU are left out; lines pointing at them are
    /// stored unresolved.
    pub async fn load_table(&self) -> Result<SkuResolutionTable, AppError> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT product_no, variant_code, sku
            FROM cafe24_product_variants
            WHERE sku IS NOT NULL AND btrim(sku) <> ''
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        let table: SkuResolutionTable = rows
            .into_iter()
            .map(|(product_no, variant_code, sku)| (product_no, variant_code, sku.trim().to_string()))
            .collect();

        debug!(entries = table.len(), "Loaded SKU resolution table");
        Ok(table)
    }
}

#[async_trait]
impl SkuSource for SkuRepository {
    async fn load_sku_table(&self) -> Result<SkuResolutionTable, AppError> {
        self.load_table().await
    }
}
