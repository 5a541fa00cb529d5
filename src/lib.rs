//! HTTP cache freshness and byte-range reconciliation
//!
//! - [`http`]: response header store, freshness, `Vary` fingerprints
//! - [`cache`]: the sparse cache interface and the range state machine
//! - [`config`]: layered settings
//! - [`logger`]: leveled diagnostics and range traces

pub mod cache;
pub mod config;
pub mod http;
pub mod logger;
