//! Bybit web API client
//!
//! Fetches grid-bot inventory pages from the brokerage as raw, untyped JSON
//! envelopes. Interpreting the envelope is left to the caller.

pub mod client;
pub mod types;

pub use client::{BybitClient, BybitClientConfig};
pub use types::*;
