//! Order sync orchestration.
//!
//! One run fetches orders for a date range, then walks every line strictly in
//! sequence: map → upsert → (eligible) deduct inventory → match customer.
//! Only a failed fetch or SKU table load ends the run; every per-line failure
//! is logged and folded into the counters.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::AppError;
use crate::mapper::{map_line, CarrierTable, MappingContext};
use crate::models::{CanonicalOrderLine, DateRange, NewInventoryRecord, PersistedLine, SkuResolutionTable};
use crate::ports::{ChannelClient, CustomerMatcher, InventoryStore, OrderLineStore, SkuSource};
use crate::sync::{deducted_stock, deduction_decision, LineOutcome, SyncReport, SyncStats};

/// Collaborators of a [`SyncService`].
#[derive(Clone)]
pub struct SyncDeps {
    pub channel: Arc<dyn ChannelClient>,
    pub orders: Arc<dyn OrderLineStore>,
    pub skus: Arc<dyn SkuSource>,
    pub inventory: Arc<dyn InventoryStore>,
    pub customers: Arc<dyn CustomerMatcher>,
}

/// Drives order sync runs against injected collaborators.
///
/// Runs are serialized: the inventory step is a read-modify-write on shared
/// per-SKU records, so a second trigger waits for the first to finish.
pub struct SyncService {
    deps: SyncDeps,
    carriers: CarrierTable,
    config: SyncConfig,
    run_lock: Mutex<()>,
}

impl SyncService {
    pub fn new(deps: SyncDeps, config: SyncConfig) -> Self {
        Self {
            deps,
            carriers: CarrierTable::cafe24(),
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one sync over `range` and returns its summary.
    ///
    /// # Errors
    ///
    /// Fails only when the channel fetch or the SKU table load fails. Lines
    /// that cannot be stored are counted as skipped instead.
    pub async fn run(&self, range: DateRange) -> Result<SyncReport, AppError> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();
        let channel = self.deps.channel.channel();

        info!(
            channel,
            start = %range.start,
            end = %range.end,
            "Starting order sync"
        );

        let orders = self
            .deps
            .channel
            .fetch_orders(&range, self.config.page_limit)
            .await?;
        info!("Fetched {} orders from {}", orders.len(), channel);

        if orders.is_empty() {
            return Ok(SyncReport::empty(elapsed_ms(started)));
        }

        let skus = self.deps.skus.load_sku_table().await?;
        debug!("Loaded {} SKU resolution entries", skus.len());

        let ctx = MappingContext {
            channel,
            skus: &skus,
            carriers: &self.carriers,
            synced_at: Utc::now(),
        };

        let mut stats = SyncStats::new();
        for order in &orders {
            for item in &order.items {
                let line = map_line(&ctx, order, item);
                self.process_line(&line, &skus, &mut stats).await;
            }
        }

        let report = SyncReport::new(orders.len(), &stats, elapsed_ms(started));
        info!(
            "Order sync complete: {} synced, {} skipped, {} stock deducted, {} customers matched ({}ms)",
            report.orders_synced,
            report.orders_skipped,
            report.stock_deducted,
            report.customers_matched,
            report.duration_ms
        );
        Ok(report)
    }

    async fn process_line(
        &self,
        line: &CanonicalOrderLine,
        skus: &SkuResolutionTable,
        stats: &mut SyncStats,
    ) {
        let persisted = match self.deps.orders.upsert(line).await {
            Ok(persisted) => persisted,
            Err(e) => {
                error!(uniq = %line.uniq, error = %e, "Failed to save order line");
                stats.record(LineOutcome::Skipped);
                return;
            }
        };
        stats.record(LineOutcome::Synced);

        let decision =
            deduction_decision(self.config.deduction_policy, &persisted.outcome, &persisted.status);
        if decision.deduct {
            match self.deduct_inventory(line, skus).await {
                Ok(Some(record)) => {
                    stats.record_deduction();
                    info!(
                        uniq = %line.uniq,
                        sku = %record.sku,
                        "Stock deducted: {} → {} ({})",
                        record.previous_stock,
                        record.current_stock,
                        record.stock_change
                    );
                }
                Ok(None) => {
                    debug!(uniq = %line.uniq, "No SKU mapping, inventory untouched");
                }
                Err(e) => {
                    warn!(uniq = %line.uniq, error = %e, "Inventory deduction failed");
                }
            }
        } else {
            debug!(uniq = %line.uniq, reason = decision.reason, "Skipping inventory deduction");
        }

        match self.match_customer(&persisted).await {
            Ok(true) => stats.record_customer_match(),
            Ok(false) => {}
            Err(e) => {
                warn!(uniq = %line.uniq, error = %e, "Customer matching failed");
            }
        }
    }

    /// Decrements stock for the line's SKU.
    ///
    /// Returns `Ok(None)` when the line has no SKU mapping. The new stock is
    /// clamped at zero; `stock_change` always records the full quantity.
    pub async fn deduct_inventory(
        &self,
        line: &CanonicalOrderLine,
        skus: &SkuResolutionTable,
    ) -> Result<Option<NewInventoryRecord>, AppError> {
        let Some(variant) = line.channel_variant_code.as_deref() else {
            return Ok(None);
        };
        let Some(sku) = skus.resolve(line.channel_product_id, variant) else {
            return Ok(None);
        };

        let latest = self
            .deps
            .inventory
            .latest(sku)
            .await?
            .ok_or_else(|| AppError::InventoryNotFound(sku.to_string()))?;

        let record = NewInventoryRecord {
            sku: sku.to_string(),
            current_stock: deducted_stock(latest.current_stock, line.quantity),
            previous_stock: latest.current_stock,
            stock_change: -line.quantity,
            synced_at: Utc::now(),
            reason: format!("{} order {}", line.channel, line.channel_order_no),
            reference_id: line.uniq.clone(),
        };
        self.deps.inventory.insert(&record).await?;

        Ok(Some(record))
    }

    /// Returns whether the line was linked to a customer.
    async fn match_customer(&self, persisted: &PersistedLine) -> Result<bool, AppError> {
        match self.deps.customers.match_or_create(persisted).await? {
            Some(customer_id) => {
                self.deps.customers.link(persisted.id, customer_id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChannelOrder, ChannelOrderItem, ChannelReceiver, InventoryRecord, OrderStatus,
        ReceiverField, UpsertOutcome,
    };
    use crate::sync::DeductionPolicy;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    // =========================================================================
    // In-memory collaborators
    // =========================================================================

    struct FakeChannel {
        orders: Result<Vec<ChannelOrder>, (u16, String)>,
    }

    #[async_trait]
    impl ChannelClient for FakeChannel {
        fn channel(&self) -> &str {
            "cafe24"
        }

        async fn fetch_orders(
            &self,
            _range: &DateRange,
            _page_limit: u32,
        ) -> Result<Vec<ChannelOrder>, AppError> {
            match &self.orders {
                Ok(orders) => Ok(orders.clone()),
                Err((status, payload)) => Err(AppError::ChannelError {
                    status: *status,
                    payload: payload.clone(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct MemoryOrderStore {
        rows: StdMutex<HashMap<String, (Uuid, OrderStatus)>>,
        fail_uniq: Option<String>,
    }

    impl MemoryOrderStore {
        fn failing_on(uniq: &str) -> Self {
            Self {
                fail_uniq: Some(uniq.to_string()),
                ..Default::default()
            }
        }

        fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        fn set_status(&self, uniq: &str, status: OrderStatus) {
            let mut rows = self.rows.lock().unwrap();
            let id = Uuid::new_v4();
            rows.insert(uniq.to_string(), (id, status));
        }
    }

    #[async_trait]
    impl OrderLineStore for MemoryOrderStore {
        async fn upsert(&self, line: &CanonicalOrderLine) -> Result<PersistedLine, AppError> {
            if self.fail_uniq.as_deref() == Some(line.uniq.as_str()) {
                return Err(AppError::Generic("forced upsert failure".to_string()));
            }

            let mut rows = self.rows.lock().unwrap();
            let (id, outcome) = match rows.get(&line.uniq) {
                Some((id, previous)) => (
                    *id,
                    UpsertOutcome::Updated {
                        previous_status: previous.clone(),
                    },
                ),
                None => (Uuid::new_v4(), UpsertOutcome::Inserted),
            };
            rows.insert(line.uniq.clone(), (id, line.status.clone()));

            Ok(PersistedLine {
                id,
                uniq: line.uniq.clone(),
                outcome,
                status: line.status.clone(),
                channel: line.channel.clone(),
                receiver_name: line.receiver_name.clone(),
                receiver_phone: line.receiver_phone.clone(),
                receiver_cellphone: line.receiver_cellphone.clone(),
                line_payment_amount: line.line_payment_amount,
                ordered_at: line.ordered_at,
            })
        }
    }

    #[derive(Default)]
    struct StaticSkus {
        table: SkuResolutionTable,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl SkuSource for StaticSkus {
        async fn load_sku_table(&self) -> Result<SkuResolutionTable, AppError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.clone())
        }
    }

    #[derive(Default)]
    struct MemoryInventory {
        records: StdMutex<Vec<InventoryRecord>>,
        writes: AtomicUsize,
    }

    impl MemoryInventory {
        fn with_stock(sku: &str, stock: i64) -> Self {
            let inventory = Self::default();
            inventory.records.lock().unwrap().push(InventoryRecord {
                sku: sku.to_string(),
                current_stock: stock,
                previous_stock: stock,
                stock_change: 0,
                synced_at: Utc::now() - chrono::Duration::days(1),
            });
            inventory
        }

        fn latest_record(&self, sku: &str) -> Option<InventoryRecord> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.sku == sku)
                .max_by_key(|r| r.synced_at)
                .cloned()
        }

        fn write_count(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InventoryStore for MemoryInventory {
        async fn latest(&self, sku: &str) -> Result<Option<InventoryRecord>, AppError> {
            Ok(self.latest_record(sku))
        }

        async fn insert(&self, record: &NewInventoryRecord) -> Result<(), AppError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.records.lock().unwrap().push(InventoryRecord {
                sku: record.sku.clone(),
                current_stock: record.current_stock,
                previous_stock: record.previous_stock,
                stock_change: record.stock_change,
                synced_at: record.synced_at,
            });
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMatcher {
        fail: bool,
        links: StdMutex<Vec<(Uuid, Uuid)>>,
    }

    #[async_trait]
    impl CustomerMatcher for FakeMatcher {
        async fn match_or_create(&self, line: &PersistedLine) -> Result<Option<Uuid>, AppError> {
            if self.fail {
                return Err(AppError::Generic("customer store down".to_string()));
            }
            Ok(line.receiver_name.as_ref().map(|_| Uuid::new_v4()))
        }

        async fn link(&self, order_line_id: Uuid, customer_id: Uuid) -> Result<(), AppError> {
            self.links.lock().unwrap().push((order_line_id, customer_id));
            Ok(())
        }
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    struct Harness {
        service: SyncService,
        orders: Arc<MemoryOrderStore>,
        skus: Arc<StaticSkus>,
        inventory: Arc<MemoryInventory>,
        customers: Arc<FakeMatcher>,
    }

    fn harness_with(
        channel: FakeChannel,
        orders: MemoryOrderStore,
        table: SkuResolutionTable,
        inventory: MemoryInventory,
        customers: FakeMatcher,
        policy: DeductionPolicy,
    ) -> Harness {
        let orders = Arc::new(orders);
        let skus = Arc::new(StaticSkus {
            table,
            ..Default::default()
        });
        let inventory = Arc::new(inventory);
        let customers = Arc::new(customers);

        let deps = SyncDeps {
            channel: Arc::new(channel),
            orders: orders.clone(),
            skus: skus.clone(),
            inventory: inventory.clone(),
            customers: customers.clone(),
        };
        let config = SyncConfig {
            deduction_policy: policy,
            ..Default::default()
        };

        Harness {
            service: SyncService::new(deps, config),
            orders,
            skus,
            inventory,
            customers,
        }
    }

    fn harness(orders: Vec<ChannelOrder>, table: SkuResolutionTable, stock: i64) -> Harness {
        harness_with(
            FakeChannel { orders: Ok(orders) },
            MemoryOrderStore::default(),
            table,
            MemoryInventory::with_stock("SH-55-A", stock),
            FakeMatcher::default(),
            DeductionPolicy::OnTransition,
        )
    }

    fn sku_table() -> SkuResolutionTable {
        vec![(55, "A".to_string(), "SH-55-A".to_string())]
            .into_iter()
            .collect()
    }

    fn line_item(code: &str, qty: i64, status: &str) -> ChannelOrderItem {
        ChannelOrderItem {
            order_item_code: code.to_string(),
            product_no: 55,
            variant_code: Some("A".to_string()),
            product_price: 15000.0,
            quantity: qty,
            additional_discount_price: 0.0,
            order_status: status.to_string(),
            ..Default::default()
        }
    }

    fn order(id: &str, items: Vec<ChannelOrderItem>) -> ChannelOrder {
        ChannelOrder {
            order_id: id.to_string(),
            receiver: Some(ReceiverField::One(ChannelReceiver {
                name: Some("김수령".to_string()),
                cellphone: Some("010-1234-5678".to_string()),
                ..Default::default()
            })),
            items,
            ..Default::default()
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        )
        .unwrap()
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn test_empty_fetch_short_circuits() {
        let h = harness(vec![], sku_table(), 10);

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report, SyncReport::empty(report.duration_ms));
        assert_eq!(h.skus.loads.load(Ordering::SeqCst), 0);
        assert_eq!(h.inventory.write_count(), 0);
        assert_eq!(h.orders.row_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let h = harness_with(
            FakeChannel {
                orders: Err((401, r#"{"error":{"code":401}}"#.to_string())),
            },
            MemoryOrderStore::default(),
            sku_table(),
            MemoryInventory::default(),
            FakeMatcher::default(),
            DeductionPolicy::OnTransition,
        );

        let err = h.service.run(range()).await.unwrap_err();

        assert!(matches!(err, AppError::ChannelError { status: 401, .. }));
        assert_eq!(h.orders.row_count(), 0);
    }

    #[tokio::test]
    async fn test_end_to_end_paid_line_deducts_stock() {
        let h = harness(
            vec![order("20250101-001", vec![line_item("20250101-001-01", 2, "N10")])],
            sku_table(),
            10,
        );

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.orders_synced, 1);
        assert_eq!(report.orders_skipped, 0);
        assert_eq!(report.stock_deducted, 1);
        assert_eq!(report.customers_matched, 1);

        let rows = h.orders.rows.lock().unwrap();
        let (_, status) = rows.get("cafe24_20250101-001_20250101-001-01").unwrap();
        assert_eq!(status.label(), "결제완료");
        drop(rows);

        let latest = h.inventory.latest_record("SH-55-A").unwrap();
        assert_eq!(latest.stock_change, -2);
        assert_eq!(latest.previous_stock, 10);
        assert_eq!(latest.current_stock, 8);
        assert_eq!(h.customers.links.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resync_is_idempotent_and_does_not_deduct_twice() {
        let orders = vec![
            order("A", vec![line_item("A-01", 1, "N10"), line_item("A-02", 1, "N20")]),
            order("B", vec![line_item("B-01", 1, "N30")]),
        ];
        let h = harness(orders, sku_table(), 10);

        let first = h.service.run(range()).await.unwrap();
        let rows_after_first = h.orders.row_count();
        let second = h.service.run(range()).await.unwrap();

        assert_eq!(rows_after_first, 3);
        assert_eq!(h.orders.row_count(), rows_after_first);
        assert_eq!(first.orders_synced, 3);
        assert_eq!(second.orders_synced, 3);
        assert_eq!(first.stock_deducted, 2);
        assert_eq!(second.stock_deducted, 0);
        assert_eq!(h.inventory.latest_record("SH-55-A").unwrap().current_stock, 8);
    }

    #[tokio::test]
    async fn test_every_upsert_policy_deducts_on_each_sync() {
        let h = harness_with(
            FakeChannel {
                orders: Ok(vec![order("A", vec![line_item("A-01", 1, "N10")])]),
            },
            MemoryOrderStore::default(),
            sku_table(),
            MemoryInventory::with_stock("SH-55-A", 10),
            FakeMatcher::default(),
            DeductionPolicy::OnEveryUpsert,
        );

        h.service.run(range()).await.unwrap();
        let second = h.service.run(range()).await.unwrap();

        assert_eq!(second.stock_deducted, 1);
        assert_eq!(h.inventory.write_count(), 2);
        assert_eq!(h.inventory.latest_record("SH-55-A").unwrap().current_stock, 8);
    }

    #[tokio::test]
    async fn test_non_eligible_status_writes_no_inventory() {
        let orders = vec![order(
            "A",
            vec![
                line_item("A-01", 1, "N00"),
                line_item("A-02", 1, "N40"),
                line_item("A-03", 1, "C00"),
                line_item("A-04", 1, "Z99"),
            ],
        )];
        let h = harness(orders, sku_table(), 10);

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.orders_synced, 4);
        assert_eq!(report.stock_deducted, 0);
        assert_eq!(h.inventory.write_count(), 0);
    }

    #[tokio::test]
    async fn test_payment_after_awaiting_deducts_once() {
        let h = harness(
            vec![order("A", vec![line_item("A-01", 3, "N10")])],
            sku_table(),
            10,
        );
        h.orders
            .set_status("cafe24_A_A-01", OrderStatus::AwaitingPayment);

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.stock_deducted, 1);
        assert_eq!(h.inventory.latest_record("SH-55-A").unwrap().current_stock, 7);
    }

    #[tokio::test]
    async fn test_stock_never_goes_negative() {
        let h = harness(
            vec![order("A", vec![line_item("A-01", 5, "N20")])],
            sku_table(),
            3,
        );

        h.service.run(range()).await.unwrap();

        let latest = h.inventory.latest_record("SH-55-A").unwrap();
        assert_eq!(latest.current_stock, 0);
        assert_eq!(latest.previous_stock, 3);
        assert_eq!(latest.stock_change, -5);
    }

    #[tokio::test]
    async fn test_unresolved_sku_syncs_without_deduction() {
        let mut unmapped = line_item("A-01", 1, "N10");
        unmapped.variant_code = Some("ZZ".to_string());
        let mut no_variant = line_item("A-02", 1, "N10");
        no_variant.variant_code = None;
        let h = harness(vec![order("A", vec![unmapped, no_variant])], sku_table(), 10);

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.orders_synced, 2);
        assert_eq!(report.stock_deducted, 0);
        assert_eq!(h.inventory.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_inventory_record_is_isolated() {
        let h = harness_with(
            FakeChannel {
                orders: Ok(vec![order("A", vec![line_item("A-01", 1, "N10")])]),
            },
            MemoryOrderStore::default(),
            sku_table(),
            MemoryInventory::default(),
            FakeMatcher::default(),
            DeductionPolicy::OnTransition,
        );

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.orders_synced, 1);
        assert_eq!(report.stock_deducted, 0);
        assert_eq!(report.customers_matched, 1);
    }

    #[tokio::test]
    async fn test_single_upsert_failure_is_isolated() {
        let orders = vec![
            order("A", vec![line_item("A-01", 1, "N10"), line_item("A-02", 1, "N30")]),
            order("B", vec![line_item("B-01", 1, "N10")]),
            order("C", vec![line_item("C-01", 1, "N40")]),
        ];
        let h = harness_with(
            FakeChannel { orders: Ok(orders) },
            MemoryOrderStore::failing_on("cafe24_B_B-01"),
            sku_table(),
            MemoryInventory::with_stock("SH-55-A", 10),
            FakeMatcher::default(),
            DeductionPolicy::OnTransition,
        );

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.orders_fetched, 3);
        assert_eq!(report.orders_synced, 3);
        assert_eq!(report.orders_skipped, 1);
        assert_eq!(report.stock_deducted, 1);
        assert_eq!(report.status_label(), "partial");
    }

    #[tokio::test]
    async fn test_customer_failure_does_not_fail_sync() {
        let h = harness_with(
            FakeChannel {
                orders: Ok(vec![order("A", vec![line_item("A-01", 1, "N10")])]),
            },
            MemoryOrderStore::default(),
            sku_table(),
            MemoryInventory::with_stock("SH-55-A", 10),
            FakeMatcher {
                fail: true,
                ..Default::default()
            },
            DeductionPolicy::OnTransition,
        );

        let report = h.service.run(range()).await.unwrap();

        assert_eq!(report.orders_synced, 1);
        assert_eq!(report.stock_deducted, 1);
        assert_eq!(report.customers_matched, 0);
    }

    #[tokio::test]
    async fn test_overlapping_runs_are_serialized() {
        let h = harness(
            vec![order("A", vec![line_item("A-01", 4, "N10")])],
            sku_table(),
            10,
        );
        let service = Arc::new(h.service);

        let (a, b) = tokio::join!(service.run(range()), service.run(range()));

        let deducted = a.unwrap().stock_deducted + b.unwrap().stock_deducted;
        assert_eq!(deducted, 1);
        assert_eq!(h.inventory.write_count(), 1);
        assert_eq!(h.inventory.latest_record("SH-55-A").unwrap().current_stock, 6);
    }
}
