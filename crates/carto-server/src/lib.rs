//! REST/JSON server for the carto geospatial store.
//!
//! Routes `/api/1.0/...` onto the layer registry, stamps every routed
//! operation with a transaction id, journals mutations, and serves record
//! content over `/public/...`.
//!
//! # Key Types
//!
//! - [`CartoServer`]: boot, serve, graceful shutdown
//! - [`ServerConfig`]: the TOML configuration file
//! - [`AppState`]: registry + stamper + journal, injected into handlers
//! - [`ApiError`]: HTTP error replies carrying the operation's tid

pub mod config;
pub mod error;
pub mod handlers;
pub mod reply;
pub mod router;
pub mod server;
pub mod state;

pub use config::{JournalConfig, ListenConfig, ServerConfig};
pub use error::{ApiError, ServerError, ServerResult};
pub use server::{bootstrap, CartoServer};
pub use state::AppState;
