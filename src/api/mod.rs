//! HTTP surface: router, handlers, wire types and admission control.

pub mod admission;
pub mod handlers;
pub mod server;
pub mod types;

pub use server::{ApiState, SentinelServer};
