//! ordersync client - HTTP clients for commerce channel APIs
//!
//! - [`cafe24`] - Cafe24 Admin API order listing
//!
//! The client handles authentication headers, pagination, response parsing
//! and retry on transient failures.

pub mod cafe24;

pub use cafe24::Cafe24Client;
