//! Storage engine for carto.
//!
//! The engine owns everything between the REST surface and the spatial
//! index: named layers holding keyed records, the registry routing by layer
//! name, the server-wide transaction stamper, and the typed mutation ops
//! shared with the journal.
//!
//! The engine performs no I/O. Callers stamp operations, apply them here,
//! and persist the resulting [`Mutation`] values themselves.

pub mod config;
pub mod error;
pub mod layer;
pub mod ops;
pub mod registry;
pub mod stamper;

pub use config::StoreConfig;
pub use error::{EngineError, Result};
pub use layer::{KeysResult, Layer, SearchMatch, SearchResult};
pub use ops::{Mutation, PutRequest};
pub use registry::{CreateOutcome, LayerInfo, LayerRegistry};
pub use stamper::TidStamper;
