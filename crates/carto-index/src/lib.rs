//! Per-layer quadtree spatial index.
//!
//! Each layer owns one [`QuadTree`] mapping positions to record keys. The
//! tree adapts to density: buckets split into quadrants when they fill up,
//! and sparse quadrants merge back into a single bucket as entries leave.
//! Searches prune whole subtrees by rect intersection, so radius and
//! bounding-rect queries stay sub-linear as layers grow.

pub mod quadtree;

pub use quadtree::{IndexConfig, QuadTree, SearchHit, SearchOutcome, Slot};
