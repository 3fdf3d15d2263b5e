use serde::{Deserialize, Serialize};

use carto_types::{Position, Properties};

/// Parsed body of a record PUT.
///
/// A single PUT can move the record, edit individual properties, merge new
/// ones, and adjust expiry. Application order is fixed: position, deletions,
/// counter adds, plain merges, expiry. The whole request applies atomically
/// under the layer's write lock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    /// New position (`_loc`). Re-indexing is skipped when it matches the
    /// stored position exactly.
    #[serde(default)]
    pub position: Option<Position>,
    /// Absolute expiry in epoch seconds (`_expires_at`). `Some(0)` clears
    /// any existing expiry.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Clear the whole property map first (`_delete_all`).
    #[serde(default)]
    pub delete_all: bool,
    /// Properties to remove (`_delete:<name>`).
    #[serde(default)]
    pub deletes: Vec<String>,
    /// Integer deltas (`_add_int:<name>`): the existing value is read as an
    /// integer (absent or non-numeric reads as 0) and the sum stored back.
    #[serde(default)]
    pub add_ints: Vec<(String, i64)>,
    /// Plain property merges, replacing per key.
    #[serde(default)]
    pub sets: Properties,
}

impl PutRequest {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A journaled state change. Reads, searches, and system calls draw tids
/// but are never recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    CreateLayer {
        layer: String,
    },
    DropLayer {
        layer: String,
    },
    PutRecord {
        layer: String,
        key: String,
        body: PutRequest,
    },
    DeleteRecord {
        layer: String,
        key: String,
    },
}

impl Mutation {
    /// The layer this mutation targets.
    pub fn layer(&self) -> &str {
        match self {
            Self::CreateLayer { layer }
            | Self::DropLayer { layer }
            | Self::PutRecord { layer, .. }
            | Self::DeleteRecord { layer, .. } => layer,
        }
    }
}
