//! REST API module for external integrations
//!
//! Serves health, Prometheus metrics and a read-only view of managed clusters.

mod dto;
mod handlers;
mod server;

pub use server::run_server;
