//! ordersync CLI - command-line and HTTP triggers for order sync runs.

pub mod config;
pub mod server;

pub use config::{Command, Config};
pub use server::{router, trigger_sync, AppState, SyncResponse, SyncSummary};
