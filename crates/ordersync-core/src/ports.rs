//! Boundaries between the sync pipeline and its collaborators.
//!
//! Implementations are assembled once at process start and injected into
//! [`crate::pipeline::SyncService`]. The HTTP client lives in
//! `ordersync-client`, the PostgreSQL implementations in `ordersync-db`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    CanonicalOrderLine, ChannelOrder, DateRange, InventoryRecord, NewInventoryRecord,
    PersistedLine, SkuResolutionTable,
};

/// Fetches channel-native orders.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Channel name used in `uniq` keys, e.g. `"cafe24"`.
    fn channel(&self) -> &str;

    /// Returns every order dated inside `range`, following pagination with
    /// pages of `page_limit` orders. Does not deduplicate.
    async fn fetch_orders(
        &self,
        range: &DateRange,
        page_limit: u32,
    ) -> Result<Vec<ChannelOrder>, AppError>;
}

/// Idempotent order-line persistence keyed by `uniq`.
#[async_trait]
pub trait OrderLineStore: Send + Sync {
    async fn upsert(&self, line: &CanonicalOrderLine) -> Result<PersistedLine, AppError>;
}

/// Source of the per-run SKU resolution table.
#[async_trait]
pub trait SkuSource: Send + Sync {
    async fn load_sku_table(&self) -> Result<SkuResolutionTable, AppError>;
}

/// Per-SKU inventory snapshots.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Latest snapshot for `sku` by `synced_at`.
    async fn latest(&self, sku: &str) -> Result<Option<InventoryRecord>, AppError>;

    async fn insert(&self, record: &NewInventoryRecord) -> Result<(), AppError>;
}

/// Best-effort customer identity resolution.
#[async_trait]
pub trait CustomerMatcher: Send + Sync {
    /// Finds or creates the customer behind an order line. `None` when the
    /// line carries too little identity to match.
    async fn match_or_create(&self, line: &PersistedLine) -> Result<Option<Uuid>, AppError>;

    async fn link(&self, order_line_id: Uuid, customer_id: Uuid) -> Result<(), AppError>;
}
