use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// Open property bag attached to a record. Values are arbitrary JSON,
/// opaque to the engine.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// A keyed entry in a layer: optional position, property bag, optional
/// absolute expiry in epoch seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            position: None,
            properties: Properties::new(),
            expires_at: None,
        }
    }

    /// Shape derived from which parts are populated.
    pub fn shape(&self) -> RecordShape {
        match (self.position.is_some(), !self.properties.is_empty()) {
            (false, false) => RecordShape::Void,
            (true, false) => RecordShape::Point,
            (false, true) => RecordShape::Hash,
            (true, true) => RecordShape::PointHash,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Which parts of a record are populated, as reported in record JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordShape {
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "point")]
    Point,
    #[serde(rename = "hash")]
    Hash,
    #[serde(rename = "point+hash")]
    PointHash,
}

impl RecordShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Point => "point",
            Self::Hash => "hash",
            Self::PointHash => "point+hash",
        }
    }
}

impl fmt::Display for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
