//! Scoring oracle client and wire format.

pub mod client;
pub mod dto;

pub use client::{HttpScoringClient, ScoringOracle};
