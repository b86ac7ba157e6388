//! ordersync core - domain types, order mapping, error handling, configuration
//! and the sync pipeline.

pub mod config;
pub mod error;
pub mod mapper;
pub mod models;
pub mod pipeline;
pub mod ports;
pub mod sync;

pub use config::{default_config_path, load_config, DbConfig, FileConfig, HttpConfig, SyncConfig};
pub use error::AppError;
pub use mapper::{map_line, translate_status, CarrierTable, MappingContext};
pub use models::{
    CanonicalOrderLine, ChannelOrder, ChannelOrderItem, ChannelReceiver, DateRange,
    InventoryRecord, NewInventoryRecord, OrderStatus, PersistedLine, SkuResolutionTable,
    UpsertOutcome, CAFE24_CHANNEL,
};
pub use pipeline::{SyncDeps, SyncService};
pub use ports::{ChannelClient, CustomerMatcher, InventoryStore, OrderLineStore, SkuSource};
pub use sync::{
    deducted_stock, deduction_decision, DeductionDecision, DeductionPolicy, LineOutcome,
    SyncReport, SyncStats,
};
