//! PostgreSQL implementations of the ordersync storage ports.

pub mod customers;
pub mod inventory;
pub mod order_lines;
pub mod skus;
pub mod sync_log;

pub use customers::{customer_identity, normalize_phone, CustomerIdentity, CustomerRepository};
pub use inventory::InventoryRepository;
pub use order_lines::OrderLineRepository;
pub use skus::SkuRepository;
pub use sync_log::{SyncLogEntry, SyncLogRepository};
