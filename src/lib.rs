//! Chain Sentinel
//!
//! Real-time fraud alert pipeline for blockchain transactions. Ingested
//! transactions are validated, scored by an external ML oracle, run
//! through an alert lifecycle with deduplication, fanned out to
//! notification channels, and broadcast to live subscribers.

pub mod alerts;
pub mod api;
pub mod core;
pub mod gateway;
pub mod hub;
pub mod notify;
pub mod scoring;
pub mod storage;

pub use crate::api::SentinelServer;
pub use crate::core::config::SentinelConfig;
pub use crate::core::errors::{Result, SentinelError};
