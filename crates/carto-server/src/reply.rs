use serde::Serialize;

use carto_engine::{LayerInfo, SearchMatch, SearchResult};
use carto_types::{Position, Properties, Record, RecordShape};

/// `{"tid":N,"error":...}`
#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub tid: u64,
    pub error: &'static str,
}

/// `{"tid":N,"status":...}`
#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub tid: u64,
    pub status: &'static str,
}

/// `{"tid":N,"pong":"pong"}`
#[derive(Debug, Serialize)]
pub struct PongReply {
    pub tid: u64,
    pub pong: &'static str,
}

/// `{"tid":N,"rewrite":"started"}`
#[derive(Debug, Serialize)]
pub struct RewriteReply {
    pub tid: u64,
    pub rewrite: &'static str,
}

/// `{"tid":N,"layers":[...]}`
#[derive(Debug, Serialize)]
pub struct LayersReply {
    pub tid: u64,
    pub layers: Vec<LayerInfo>,
}

/// A single record GET: tid first, then the record fields inline.
#[derive(Debug, Serialize)]
pub struct RecordReply {
    pub tid: u64,
    #[serde(flatten)]
    pub record: RecordView,
}

/// `{"tid":N,"matches":[...]}`, or `{"tid":N,"overflow":true,"matches":[]}`
/// when the result limit was exhausted mid-search.
#[derive(Debug, Serialize)]
pub struct SearchReply {
    pub tid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overflow: Option<bool>,
    pub matches: Vec<MatchView>,
}

impl SearchReply {
    /// An overflowed search reports only the overflow flag; partial
    /// matches are discarded.
    pub fn new(tid: u64, result: SearchResult, with_properties: bool) -> Self {
        if result.overflow {
            return Self {
                tid,
                overflow: Some(true),
                matches: Vec::new(),
            };
        }
        Self {
            tid,
            overflow: None,
            matches: result
                .matches
                .into_iter()
                .map(|m| MatchView::new(m, with_properties))
                .collect(),
        }
    }
}

/// Bare key listing for `keys` searches with `content=0`.
#[derive(Debug, Serialize)]
pub struct KeysReply {
    pub tid: u64,
    pub keys: Vec<String>,
}

/// Wire shape of one record: flattened position, derived `type`, and the
/// property map (suppressed by `properties=0` on searches).
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub key: String,
    #[serde(rename = "type")]
    pub shape: RecordShape,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl RecordView {
    pub fn new(record: Record, with_properties: bool) -> Self {
        let shape = record.shape();
        let properties =
            (with_properties && !record.properties.is_empty()).then_some(record.properties);
        Self {
            key: record.key,
            shape,
            latitude: record.position.map(|p| p.latitude),
            longitude: record.position.map(|p| p.longitude),
            expires_at: record.expires_at,
            properties,
            distance: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// One search match: a record or a cluster summary.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MatchView {
    Record(RecordView),
    Cluster(ClusterView),
}

impl MatchView {
    pub fn new(m: SearchMatch, with_properties: bool) -> Self {
        match m {
            SearchMatch::Record { record, distance } => {
                Self::Record(RecordView::new(record, with_properties).with_distance(distance))
            }
            SearchMatch::Cluster {
                center,
                radius,
                children,
            } => Self::Cluster(ClusterView::new(center, radius, children)),
        }
    }
}

/// A dense subtree summarized instead of enumerated.
#[derive(Debug, Serialize)]
pub struct ClusterView {
    #[serde(rename = "type")]
    pub shape: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub children: usize,
}

impl ClusterView {
    pub fn new(center: Position, radius: f64, children: usize) -> Self {
        Self {
            shape: "cluster",
            latitude: center.latitude,
            longitude: center.longitude,
            radius,
            children,
        }
    }
}
