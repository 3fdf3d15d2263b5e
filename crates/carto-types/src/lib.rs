//! Foundation types for carto.
//!
//! This crate provides the coordinate, geometry, and record types used
//! throughout the carto system. Every other carto crate depends on
//! `carto-types`.
//!
//! # Key Types
//!
//! - [`Position`] — A 2D coordinate (latitude, longitude)
//! - [`Rect`] — An axis-aligned rectangle with half-open containment
//! - [`LayerKind`] — Geometry model of a layer (flat, flatwrap, spherical, geoidal)
//! - [`DistanceFormula`] — Distance approximation used by geodetic layers
//! - [`Geometry`] — A layer's kind + formula pair, with the distance math
//! - [`Record`] — A keyed entry: optional position, property bag, optional expiry

pub mod error;
pub mod geometry;
pub mod names;
pub mod position;
pub mod record;

pub use error::{Result, TypeError};
pub use geometry::{DistanceFormula, Geometry, LayerKind, DEG_AVG_DISTANCE_M};
pub use names::{validate_layer_name, validate_record_key};
pub use position::{Position, Rect, WORLD_BOUNDS};
pub use record::{Properties, Record, RecordShape};
