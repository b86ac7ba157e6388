//! Order-line repository: idempotent upsert keyed by `uniq`.

use async_trait::async_trait;
use ordersync_core::error::AppError;
use ordersync_core::models::{CanonicalOrderLine, OrderStatus, PersistedLine, UpsertOutcome};
use ordersync_core::ports::OrderLineStore;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Repository for canonical order lines in PostgreSQL.
///
/// # Examples
///
/// ```no_run
/// use sqlx::postgres::PgPoolOptions;
/// use ordersync_db::OrderLineRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPoolOptions::new()
///     .max_connections(5)
///     .connect("postgresql://localhost/ordersync")
///     .await?;
///
/// let repo = OrderLineRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OrderLineRepository {
    pool: Pool<Postgres>,
}

impl OrderLineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates a line by `uniq` and reports which one happened.
    ///
    /// The `previous` CTE reads the row as it was before this statement, so
    /// `previous_status` is NULL exactly when the row was inserted.
    pub async fn upsert_line(&self, line: &CanonicalOrderLine) -> Result<PersistedLine, AppError> {
        let row: UpsertRow = sqlx::query_as(
            r#"
            WITH previous AS (
                SELECT status FROM order_lines WHERE uniq = $1
            )
            INSERT INTO order_lines (
                uniq,
                status,
                channel,
                channel_order_no,
                channel_product_id,
                channel_variant_code,
                sku_code,
                resolved_sku,
                product_name,
                option_label,
                quantity,
                sales_amount,
                discount_amount,
                line_payment_amount,
                orderer_name,
                orderer_phone,
                orderer_email,
                receiver_name,
                receiver_phone,
                receiver_cellphone,
                receiver_address1,
                receiver_address2,
                receiver_zipcode,
                shipping_message,
                tracking_no,
                carrier_name,
                ordered_at,
                synced_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28
            )
            ON CONFLICT (uniq)
            DO UPDATE SET
                status = EXCLUDED.status,
                channel_variant_code = EXCLUDED.channel_variant_code,
                sku_code = EXCLUDED.sku_code,
                resolved_sku = COALESCE(EXCLUDED.resolved_sku, order_lines.resolved_sku),
                product_name = EXCLUDED.product_name,
                option_label = EXCLUDED.option_label,
                quantity = EXCLUDED.quantity,
                sales_amount = EXCLUDED.sales_amount,
                discount_amount = EXCLUDED.discount_amount,
                line_payment_amount = EXCLUDED.line_payment_amount,
                orderer_name = EXCLUDED.orderer_name,
                orderer_phone = EXCLUDED.orderer_phone,
                orderer_email = EXCLUDED.orderer_email,
                receiver_name = EXCLUDED.receiver_name,
                receiver_phone = EXCLUDED.receiver_phone,
                receiver_cellphone = EXCLUDED.receiver_cellphone,
                receiver_address1 = EXCLUDED.receiver_address1,
                receiver_address2 = EXCLUDED.receiver_address2,
                receiver_zipcode = EXCLUDED.receiver_zipcode,
                shipping_message = EXCLUDED.shipping_message,
                tracking_no = EXCLUDED.tracking_no,
                carrier_name = EXCLUDED.carrier_name,
                ordered_at = EXCLUDED.ordered_at,
                synced_at = EXCLUDED.synced_at
            RETURNING id, (SELECT status FROM previous) AS previous_status
            "#,
        )
        .bind(&line.uniq)
        .bind(line.status.label())
        .bind(&line.channel)
        .bind(&line.channel_order_no)
        .bind(line.channel_product_id)
        .bind(&line.channel_variant_code)
        .bind(&line.sku_code)
        .bind(&line.resolved_sku)
        .bind(&line.product_name)
        .bind(&line.option_label)
        .bind(line.quantity)
        .bind(line.sales_amount)
        .bind(line.discount_amount)
        .bind(line.line_payment_amount)
        .bind(&line.orderer_name)
        .bind(&line.orderer_phone)
        .bind(&line.orderer_email)
        .bind(&line.receiver_name)
        .bind(&line.receiver_phone)
        .bind(&line.receiver_cellphone)
        .bind(&line.receiver_address1)
        .bind(&line.receiver_address2)
        .bind(&line.receiver_zipcode)
        .bind(&line.shipping_message)
        .bind(&line.tracking_no)
        .bind(&line.carrier_name)
        .bind(line.ordered_at)
        .bind(line.synced_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.into_persisted(line))
    }
}

#[async_trait]
impl OrderLineStore for OrderLineRepository {
    async fn upsert(&self, line: &CanonicalOrderLine) -> Result<PersistedLine, AppError> {
        self.upsert_line(line).await
    }
}

/// Helper struct for deserializing the upsert's RETURNING clause
#[derive(sqlx::FromRow)]
struct UpsertRow {
    id: Uuid,
    previous_status: Option<String>,
}

impl UpsertRow {
    fn into_persisted(self, line: &CanonicalOrderLine) -> PersistedLine {
        let outcome = match self.previous_status {
            Some(label) => UpsertOutcome::Updated {
                previous_status: OrderStatus::from_label(&label),
            },
            None => UpsertOutcome::Inserted,
        };

        PersistedLine {
            id: self.id,
            uniq: line.uniq.clone(),
            outcome,
            status: line.status.clone(),
            channel: line.channel.clone(),
            receiver_name: line.receiver_name.clone(),
            receiver_phone: line.receiver_phone.clone(),
            receiver_cellphone: line.receiver_cellphone.clone(),
            line_payment_amount: line.line_payment_amount,
            ordered_at: line.ordered_at,
        }
    }
}
