//! Health reporting.
//!
//! `GET /health` answers for the gateway alone; `GET /health/all` adds one
//! probe per configured stage (active.rs).

pub mod active;

pub use active::{probe_stages, ServiceHealth};
