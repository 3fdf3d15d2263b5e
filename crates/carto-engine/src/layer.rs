use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde_json::Value;

use carto_index::{IndexConfig, QuadTree, SearchHit, SearchOutcome};
use carto_types::{Geometry, Position, Record, Rect};

use crate::ops::PutRequest;

/// One search result: a live record with its distance from the query
/// center, or a cluster summary.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchMatch {
    Record { record: Record, distance: f64 },
    Cluster {
        center: Position,
        radius: f64,
        children: usize,
    },
}

/// Spatial search result. `overflow` means the limit was exhausted before
/// the traversal finished.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResult {
    pub matches: Vec<SearchMatch>,
    pub overflow: bool,
}

/// Key scan result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeysResult {
    pub matches: Vec<Record>,
    pub overflow: bool,
}

struct LayerCore {
    records: BTreeMap<String, Record>,
    index: QuadTree,
    /// Expiry order: (epoch seconds, key). Swept by the background purger.
    expirables: BTreeSet<(i64, String)>,
}

/// A named namespace of records with its own spatial index.
///
/// The key map and the spatial index live behind one `RwLock`, so readers
/// never observe a record present in one and absent from the other. Writers
/// to different layers do not contend.
pub struct Layer {
    name: String,
    geometry: Geometry,
    core: RwLock<LayerCore>,
}

impl Layer {
    pub fn new(name: impl Into<String>, geometry: Geometry, index_config: IndexConfig) -> Self {
        Self {
            name: name.into(),
            geometry,
            core: RwLock::new(LayerCore {
                records: BTreeMap::new(),
                index: QuadTree::new(geometry, index_config),
                expirables: BTreeSet::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Insert or update a record. Expired leftovers are discarded first, so
    /// a PUT against an expired key starts from a fresh record.
    pub fn put(&self, key: &str, body: &PutRequest, now: i64) {
        let mut guard = self.core.write().expect("lock poisoned");
        let LayerCore {
            records,
            index,
            expirables,
        } = &mut *guard;

        if records.get(key).is_some_and(|r| r.is_expired(now)) {
            if let Some(stale) = records.remove(key) {
                if let Some(p) = stale.position {
                    index.remove(key, p);
                }
                if let Some(at) = stale.expires_at {
                    expirables.remove(&(at, key.to_string()));
                }
            }
        }

        let record = records
            .entry(key.to_string())
            .or_insert_with(|| Record::new(key));

        if let Some(new_position) = body.position {
            match record.position {
                Some(old) if old == new_position => {}
                Some(old) => {
                    index.remove(&record.key, old);
                    index.insert(record.key.clone(), new_position);
                    record.position = Some(new_position);
                }
                None => {
                    index.insert(record.key.clone(), new_position);
                    record.position = Some(new_position);
                }
            }
        }

        if body.delete_all {
            record.properties.clear();
        }
        for name in &body.deletes {
            record.properties.remove(name);
        }
        for (name, delta) in &body.add_ints {
            let current = record.properties.get(name).map_or(0, property_as_int);
            record
                .properties
                .insert(name.clone(), Value::from(current.saturating_add(*delta)));
        }
        for (name, value) in &body.sets {
            record.properties.insert(name.clone(), value.clone());
        }

        if let Some(at) = body.expires_at {
            if let Some(old) = record.expires_at.take() {
                expirables.remove(&(old, record.key.clone()));
            }
            if at != 0 {
                record.expires_at = Some(at);
                expirables.insert((at, record.key.clone()));
            }
        }
    }

    /// Fetch a record. Expired records read as absent.
    pub fn get(&self, key: &str, now: i64) -> Option<Record> {
        let core = self.core.read().expect("lock poisoned");
        core.records
            .get(key)
            .filter(|r| !r.is_expired(now))
            .cloned()
    }

    /// Remove a record. Returns `false` when the key is absent or already
    /// expired; expired leftovers are still reclaimed.
    pub fn delete(&self, key: &str, now: i64) -> bool {
        let mut guard = self.core.write().expect("lock poisoned");
        let LayerCore {
            records,
            index,
            expirables,
        } = &mut *guard;

        let Some(record) = records.remove(key) else {
            return false;
        };
        if let Some(p) = record.position {
            index.remove(&record.key, p);
        }
        if let Some(at) = record.expires_at {
            expirables.remove(&(at, record.key.clone()));
        }
        !record.is_expired(now)
    }

    /// Drop every record whose expiry is due. Returns how many went.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut guard = self.core.write().expect("lock poisoned");
        let LayerCore {
            records,
            index,
            expirables,
        } = &mut *guard;

        let mut purged = 0;
        while expirables.first().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, key)) = expirables.pop_first() {
                if let Some(record) = records.remove(&key) {
                    if let Some(p) = record.position {
                        index.remove(&key, p);
                    }
                    purged += 1;
                }
            }
        }
        purged
    }

    /// All records within `radius` of `center`, nearest first.
    pub fn find_near(&self, center: Position, radius: f64, limit: usize, now: i64) -> SearchResult {
        let core = self.core.read().expect("lock poisoned");
        let out = core.index.find_near(center, radius, limit);
        materialize(&core.records, out, now)
    }

    /// All records inside `rect`, nearest to its center first.
    pub fn find_in_rect(
        &self,
        rect: Rect,
        limit: usize,
        epsilon: Option<f64>,
        now: i64,
    ) -> SearchResult {
        let core = self.core.read().expect("lock poisoned");
        let out = core.index.find_in_rect(rect, limit, epsilon);
        materialize(&core.records, out, now)
    }

    /// Key lookup: a trailing `*` scans by prefix (limit applies), anything
    /// else matches a single key exactly.
    pub fn keys(&self, pattern: &str, limit: usize, now: i64) -> KeysResult {
        let core = self.core.read().expect("lock poisoned");
        let mut result = KeysResult::default();

        if let Some(prefix) = pattern.strip_suffix('*') {
            for (key, record) in core.records.range(prefix.to_string()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                if record.is_expired(now) {
                    continue;
                }
                if result.matches.len() == limit {
                    result.overflow = true;
                    break;
                }
                result.matches.push(record.clone());
            }
        } else if let Some(record) = core.records.get(pattern) {
            if !record.is_expired(now) {
                result.matches.push(record.clone());
            }
        }
        result
    }

    /// (record count, spatially indexed count).
    pub fn stats(&self) -> (usize, usize) {
        let core = self.core.read().expect("lock poisoned");
        (core.records.len(), core.index.len())
    }

    /// Index bounds and accuracy, for layer listings.
    pub fn index_shape(&self) -> (Rect, IndexConfig) {
        let core = self.core.read().expect("lock poisoned");
        (core.index.bounds(), core.index.config())
    }

    /// Snapshot of every record, key order. Includes records that expired
    /// but have not been swept yet; replaying them restores the same state.
    pub fn dump(&self) -> Vec<Record> {
        let core = self.core.read().expect("lock poisoned");
        core.records.values().cloned().collect()
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (records, geo_records) = self.stats();
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("records", &records)
            .field("geo_records", &geo_records)
            .finish()
    }
}

fn materialize(
    records: &BTreeMap<String, Record>,
    out: SearchOutcome,
    now: i64,
) -> SearchResult {
    let matches = out
        .hits
        .into_iter()
        .filter_map(|hit| match hit {
            SearchHit::Entry { key, distance, .. } => records
                .get(&key)
                .filter(|r| !r.is_expired(now))
                .map(|r| SearchMatch::Record {
                    record: r.clone(),
                    distance,
                }),
            SearchHit::Cluster {
                center,
                radius,
                children,
            } => Some(SearchMatch::Cluster {
                center,
                radius,
                children,
            }),
        })
        .collect();
    SearchResult {
        matches,
        overflow: out.overflow,
    }
}

/// Integer view of a property value for `_add_int`. Numbers truncate,
/// numeric strings parse, everything else reads as 0.
fn property_as_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use carto_types::Properties;
    use serde_json::json;

    fn test_layer() -> Layer {
        let config = StoreConfig::default();
        Layer::new("cities", config.geometry(), config.index_config())
    }

    fn put_sets(layer: &Layer, key: &str, position: Option<Position>, sets: Properties) {
        layer.put(
            key,
            &PutRequest {
                position,
                sets,
                ..PutRequest::default()
            },
            0,
        );
    }

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // ---- put / get ----

    #[test]
    fn put_then_get_roundtrip() {
        let layer = test_layer();
        put_sets(
            &layer,
            "paris",
            Some(Position::new(48.85, 2.35)),
            props(&[("pop", json!(2_000_000))]),
        );

        let record = layer.get("paris", 0).expect("record should exist");
        assert_eq!(record.position, Some(Position::new(48.85, 2.35)));
        assert_eq!(record.properties.get("pop"), Some(&json!(2_000_000)));
        assert_eq!(layer.stats(), (1, 1));
    }

    #[test]
    fn put_is_upsert_and_merges_properties() {
        let layer = test_layer();
        put_sets(&layer, "paris", None, props(&[("a", json!(1)), ("b", json!(2))]));
        put_sets(&layer, "paris", None, props(&[("b", json!(3)), ("c", json!(4))]));

        let record = layer.get("paris", 0).unwrap();
        assert_eq!(record.properties.get("a"), Some(&json!(1)));
        assert_eq!(record.properties.get("b"), Some(&json!(3)));
        assert_eq!(record.properties.get("c"), Some(&json!(4)));
        assert_eq!(layer.stats(), (1, 0));
    }

    #[test]
    fn put_moves_record_in_the_index() {
        let layer = test_layer();
        put_sets(&layer, "p", Some(Position::new(10.0, 10.0)), Properties::new());
        put_sets(&layer, "p", Some(Position::new(-10.0, -10.0)), Properties::new());
        assert_eq!(layer.stats(), (1, 1));

        let near_old = layer.find_near(Position::new(10.0, 10.0), 1_000.0, 10, 0);
        assert!(near_old.matches.is_empty());
        let near_new = layer.find_near(Position::new(-10.0, -10.0), 1_000.0, 10, 0);
        assert_eq!(near_new.matches.len(), 1);
    }

    #[test]
    fn delete_all_runs_before_merge() {
        let layer = test_layer();
        put_sets(&layer, "k", None, props(&[("old", json!("x"))]));
        layer.put(
            "k",
            &PutRequest {
                delete_all: true,
                sets: props(&[("new", json!("y"))]),
                ..PutRequest::default()
            },
            0,
        );

        let record = layer.get("k", 0).unwrap();
        assert!(record.properties.get("old").is_none());
        assert_eq!(record.properties.get("new"), Some(&json!("y")));
    }

    #[test]
    fn delete_single_property() {
        let layer = test_layer();
        put_sets(&layer, "k", None, props(&[("a", json!(1)), ("b", json!(2))]));
        layer.put(
            "k",
            &PutRequest {
                deletes: vec!["a".into()],
                ..PutRequest::default()
            },
            0,
        );

        let record = layer.get("k", 0).unwrap();
        assert!(record.properties.get("a").is_none());
        assert_eq!(record.properties.get("b"), Some(&json!(2)));
    }

    #[test]
    fn add_int_accumulates_from_varied_representations() {
        let layer = test_layer();
        layer.put(
            "k",
            &PutRequest {
                add_ints: vec![("visits".into(), 5)],
                ..PutRequest::default()
            },
            0,
        );
        // Stored as a number now; add again.
        layer.put(
            "k",
            &PutRequest {
                add_ints: vec![("visits".into(), -2)],
                ..PutRequest::default()
            },
            0,
        );
        assert_eq!(layer.get("k", 0).unwrap().properties["visits"], json!(3));

        // String representations parse; garbage reads as zero.
        put_sets(&layer, "k", None, props(&[("visits", json!("40")), ("junk", json!("n/a"))]));
        layer.put(
            "k",
            &PutRequest {
                add_ints: vec![("visits".into(), 2), ("junk".into(), 7)],
                ..PutRequest::default()
            },
            0,
        );
        let record = layer.get("k", 0).unwrap();
        assert_eq!(record.properties["visits"], json!(42));
        assert_eq!(record.properties["junk"], json!(7));
    }

    // ---- expiry ----

    #[test]
    fn expired_records_read_as_absent() {
        let layer = test_layer();
        layer.put(
            "k",
            &PutRequest {
                expires_at: Some(100),
                ..PutRequest::default()
            },
            0,
        );
        assert!(layer.get("k", 99).is_some());
        assert!(layer.get("k", 100).is_none());
        assert!(layer.get("k", 500).is_none());
    }

    #[test]
    fn zero_expiry_clears() {
        let layer = test_layer();
        layer.put(
            "k",
            &PutRequest {
                expires_at: Some(100),
                ..PutRequest::default()
            },
            0,
        );
        layer.put(
            "k",
            &PutRequest {
                expires_at: Some(0),
                ..PutRequest::default()
            },
            0,
        );
        assert!(layer.get("k", 10_000).is_some());
        assert_eq!(layer.purge_expired(10_000), 0);
    }

    #[test]
    fn purge_reclaims_due_records_only() {
        let layer = test_layer();
        for (key, at) in [("a", 50), ("b", 100), ("c", 150)] {
            layer.put(
                key,
                &PutRequest {
                    position: Some(Position::new(1.0, 1.0)),
                    expires_at: Some(at),
                    ..PutRequest::default()
                },
                0,
            );
        }
        assert_eq!(layer.purge_expired(100), 2);
        assert_eq!(layer.stats(), (1, 1));
        assert!(layer.get("c", 100).is_some());
    }

    #[test]
    fn put_on_expired_key_starts_fresh() {
        let layer = test_layer();
        layer.put(
            "k",
            &PutRequest {
                position: Some(Position::new(5.0, 5.0)),
                expires_at: Some(100),
                sets: props(&[("old", json!(true))]),
                ..PutRequest::default()
            },
            0,
        );
        // Past expiry, a new PUT must not inherit the stale properties.
        layer.put(
            "k",
            &PutRequest {
                sets: props(&[("new", json!(true))]),
                ..PutRequest::default()
            },
            200,
        );

        let record = layer.get("k", 200).unwrap();
        assert!(record.properties.get("old").is_none());
        assert_eq!(record.properties.get("new"), Some(&json!(true)));
        assert!(record.position.is_none());
        assert_eq!(layer.stats(), (1, 0));
    }

    #[test]
    fn expired_records_never_match_searches() {
        let layer = test_layer();
        layer.put(
            "gone",
            &PutRequest {
                position: Some(Position::new(10.0, 10.0)),
                expires_at: Some(100),
                ..PutRequest::default()
            },
            0,
        );
        let out = layer.find_near(Position::new(10.0, 10.0), 1_000.0, 10, 200);
        assert!(out.matches.is_empty());
        let keys = layer.keys("*", 10, 200);
        assert!(keys.matches.is_empty());
    }

    // ---- delete ----

    #[test]
    fn delete_reports_presence_and_cleans_the_index() {
        let layer = test_layer();
        put_sets(&layer, "p", Some(Position::new(10.0, 10.0)), Properties::new());

        assert!(layer.delete("p", 0));
        assert!(!layer.delete("p", 0));
        assert_eq!(layer.stats(), (0, 0));
    }

    #[test]
    fn delete_of_expired_record_reports_absent() {
        let layer = test_layer();
        layer.put(
            "k",
            &PutRequest {
                expires_at: Some(100),
                ..PutRequest::default()
            },
            0,
        );
        assert!(!layer.delete("k", 200));
        assert_eq!(layer.stats(), (0, 0));
    }

    // ---- keys ----

    #[test]
    fn keys_exact_and_prefix() {
        let layer = test_layer();
        for key in ["paris", "paris-nord", "lyon"] {
            put_sets(&layer, key, None, Properties::new());
        }

        let exact = layer.keys("paris", 10, 0);
        assert_eq!(exact.matches.len(), 1);
        assert_eq!(exact.matches[0].key, "paris");

        let prefixed = layer.keys("paris*", 10, 0);
        let keys: Vec<&str> = prefixed.matches.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["paris", "paris-nord"]);

        let all = layer.keys("*", 10, 0);
        assert_eq!(all.matches.len(), 3);

        let missing = layer.keys("marseille", 10, 0);
        assert!(missing.matches.is_empty());
    }

    #[test]
    fn keys_prefix_overflows_at_limit() {
        let layer = test_layer();
        for i in 0..5 {
            put_sets(&layer, &format!("k{i}"), None, Properties::new());
        }
        let result = layer.keys("k*", 3, 0);
        assert!(result.overflow);
        assert_eq!(result.matches.len(), 3);
    }

    // ---- search passthrough ----

    #[test]
    fn find_in_rect_returns_live_records() {
        let layer = test_layer();
        put_sets(
            &layer,
            "paris",
            Some(Position::new(48.85, 2.35)),
            props(&[("pop", json!(2_000_000))]),
        );
        put_sets(&layer, "tokyo", Some(Position::new(35.68, 139.69)), Properties::new());

        let out = layer.find_in_rect(Rect::new(40.0, -5.0, 55.0, 10.0), 250, None, 0);
        assert_eq!(out.matches.len(), 1);
        match &out.matches[0] {
            SearchMatch::Record { record, distance } => {
                assert_eq!(record.key, "paris");
                assert!(*distance >= 0.0);
            }
            other => panic!("unexpected match: {other:?}"),
        }
    }
}
