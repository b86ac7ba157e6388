//! Customer identity resolution by receiver name and phone number.

use async_trait::async_trait;
use ordersync_core::error::AppError;
use ordersync_core::models::PersistedLine;
use ordersync_core::ports::CustomerMatcher;
use sqlx::{PgPool, Pool, Postgres};
use tracing::debug;
use uuid::Uuid;

/// Strips dashes and whitespace so `010-1234 5678` and `01012345678` match.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// Receiver identity used for customer matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerIdentity {
    pub name: String,
    /// The number as the channel sent it.
    pub phone: String,
    pub normalized_phone: String,
}

/// Identity of the line's receiver, or `None` when the name or every phone
/// number is missing. The landline is preferred over the cellphone.
pub fn customer_identity(line: &PersistedLine) -> Option<CustomerIdentity> {
    let name = line.receiver_name.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() {
        return None;
    }

    [&line.receiver_phone, &line.receiver_cellphone]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .find_map(|raw| {
            let normalized = normalize_phone(raw);
            (!normalized.is_empty()).then(|| CustomerIdentity {
                name: name.to_string(),
                phone: raw.trim().to_string(),
                normalized_phone: normalized,
            })
        })
}

/// PostgreSQL-backed [`CustomerMatcher`].
///
/// Customers are unique on `(name, normalized_phone)`. Purchase totals only
/// move when a line is stored for the first time, so re-syncing the same
/// orders leaves them unchanged.
#[derive(Clone)]
pub struct CustomerRepository {
    pool: Pool<Postgres>,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find(&self, name: &str, phone: &str) -> Result<Option<Uuid>, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM customers WHERE name = $1 AND normalized_phone = $2",
        )
        .bind(name)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(row.map(|(id,)| id))
    }

    async fn record_purchase(&self, customer_id: Uuid, line: &PersistedLine) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE customers
            SET last_order_date = COALESCE($2, NOW()),
                total_orders = total_orders + 1,
                total_amount = total_amount + $3,
                channels = CASE
                    WHEN $4 = ANY(channels) THEN channels
                    ELSE array_append(channels, $4)
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(customer_id)
        .bind(line.ordered_at)
        .bind(line.line_payment_amount)
        .bind(&line.channel)
        .execute(&self.pool)
        .await
        .map_err(AppError::DatabaseError)?;

        Ok(())
    }

    async fn create(&self, identity: &CustomerIdentity, line: &PersistedLine) -> Result<Uuid, AppError> {
        let result: Result<(Uuid,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO customers (
                name, phone, normalized_phone, first_order_date, last_order_date,
                total_orders, total_amount, channels
            )
            VALUES ($1, $2, $3, COALESCE($4, NOW()), COALESCE($4, NOW()), 1, $5, ARRAY[$6])
            RETURNING id
            "#,
        )
        .bind(&identity.name)
        .bind(&identity.phone)
        .bind(&identity.normalized_phone)
        .bind(line.ordered_at)
        .bind(line.line_payment_amount)
        .bind(&line.channel)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok((id,)) => Ok(id),
            // Another writer created the same customer first.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                debug!(name = %identity.name, "Customer created concurrently, re-reading");
                self.find(&identity.name, &identity.normalized_phone)
                    .await?
                    .ok_or_else(|| {
                        AppError::Generic(format!(
                            "customer '{}' vanished after unique violation",
                            identity.name
                        ))
                    })
            }
            Err(e) => Err(AppError::DatabaseError(e)),
        }
    }
}

#[async_trait]
impl CustomerMatcher for CustomerRepository {
    async fn match_or_create(&self, line: &PersistedLine) -> Result<Option<Uuid>, AppError> {
        let Some(identity) = customer_identity(line) else {
            return Ok(None);
        };

        if let Some(id) = self.find(&identity.name, &identity.normalized_phone).await? {
            if line.outcome.was_insert() {
                self.record_purchase(id, line).await?;
            }
            return Ok(Some(id));
        }

        self.create(&identity, line).await.map(Some)
    }

    async fn link(&self, order_line_id: Uuid, customer_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE order_lines SET customer_id = $2 WHERE id = $1")
            .bind(order_line_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(())
    }
}
