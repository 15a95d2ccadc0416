//! Alert lifecycle: creation rule, deduplication, state machine and
//! risk-factor extraction.

pub mod factors;
pub mod manager;

pub use manager::{AlertDecision, AlertManager};
