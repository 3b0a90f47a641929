//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     server.rs (router, middleware) → handlers.rs → pipeline orchestrator
//!
//! Outbound (every stage and health call):
//!     client.rs Transport → stage service
//! ```

pub mod client;
pub mod handlers;
pub mod server;

pub use client::{HyperTransport, Transport};
pub use server::{AppState, HttpServer};
