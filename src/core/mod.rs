//! Core domain types, configuration and errors.

pub mod config;
pub mod domain;
pub mod errors;
pub mod validation;

pub use config::SentinelConfig;
pub use domain::{Alert, AlertStatus, Network, Severity, Transaction, TxStatus, Verdict};
pub use errors::{Result, SentinelError};
