use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use carto_types::{validate_layer_name, LayerKind, Record};

use crate::config::StoreConfig;
use crate::error::{EngineError, Result};
use crate::layer::Layer;
use crate::ops::{Mutation, PutRequest};

/// Whether `create` made a new layer or found one already registered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateOutcome {
    Created,
    Existing,
}

/// One row of the layer listing.
#[derive(Clone, Debug, Serialize)]
pub struct LayerInfo {
    pub name: String,
    pub records: usize,
    pub geo_records: usize,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub distance_accuracy: &'static str,
    pub latitude_accuracy: f64,
    pub longitude_accuracy: f64,
    /// [lat0, lon0, lat1, lon1]
    pub bounds: [f64; 4],
}

/// The set of named layers. Layer creation and removal take the outer
/// lock; record operations only touch the target layer's own lock.
pub struct LayerRegistry {
    layers: RwLock<HashMap<String, Arc<Layer>>>,
    config: StoreConfig,
}

impl LayerRegistry {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            layers: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register a layer. Creating one that already exists is not an error,
    /// the outcome says which case applied.
    pub fn create(&self, name: &str) -> Result<CreateOutcome> {
        validate_layer_name(name)?;
        let mut layers = self.layers.write().expect("lock poisoned");
        if layers.contains_key(name) {
            return Ok(CreateOutcome::Existing);
        }
        tracing::info!(layer = name, "layer created");
        layers.insert(
            name.to_string(),
            Arc::new(Layer::new(
                name,
                self.config.geometry(),
                self.config.index_config(),
            )),
        );
        Ok(CreateOutcome::Created)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Layer>> {
        let layers = self.layers.read().expect("lock poisoned");
        layers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::LayerNotFound(name.to_string()))
    }

    /// Fetch a layer, registering it first when absent. The flag reports
    /// whether a new layer was made.
    pub fn get_or_create(&self, name: &str) -> Result<(Arc<Layer>, bool)> {
        if let Ok(layer) = self.get(name) {
            return Ok((layer, false));
        }
        let created = self.create(name)? == CreateOutcome::Created;
        Ok((self.get(name)?, created))
    }

    /// Drop a layer and everything in it.
    pub fn drop_layer(&self, name: &str) -> Result<()> {
        let mut layers = self.layers.write().expect("lock poisoned");
        match layers.remove(name) {
            Some(_) => {
                tracing::info!(layer = name, "layer dropped");
                Ok(())
            }
            None => Err(EngineError::LayerNotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let layers = self.layers.read().expect("lock poisoned");
        layers.contains_key(name)
    }

    /// Stats for every layer, name order.
    pub fn list(&self) -> Vec<LayerInfo> {
        let layers: Vec<Arc<Layer>> = {
            let guard = self.layers.read().expect("lock poisoned");
            guard.values().cloned().collect()
        };

        let mut rows: Vec<LayerInfo> = layers
            .iter()
            .map(|layer| {
                let (records, geo_records) = layer.stats();
                let (bounds, index_config) = layer.index_shape();
                let geometry = layer.geometry();
                LayerInfo {
                    name: layer.name().to_string(),
                    records,
                    geo_records,
                    kind: geometry.kind,
                    distance_accuracy: geometry.accuracy_label(),
                    latitude_accuracy: index_config.latitude_accuracy,
                    longitude_accuracy: index_config.longitude_accuracy,
                    bounds: [bounds.lat0, bounds.lon0, bounds.lat1, bounds.lon1],
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Sweep due expirations across all layers. Returns how many records
    /// were reclaimed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let layers: Vec<Arc<Layer>> = {
            let guard = self.layers.read().expect("lock poisoned");
            guard.values().cloned().collect()
        };
        layers.iter().map(|l| l.purge_expired(now)).sum()
    }

    /// Apply a journaled mutation. Replay is tolerant: mutations against
    /// layers or records that are already gone are logged and skipped.
    pub fn apply(&self, mutation: &Mutation, now: i64) -> Result<()> {
        match mutation {
            Mutation::CreateLayer { layer } => {
                self.create(layer)?;
            }
            Mutation::DropLayer { layer } => {
                if self.drop_layer(layer).is_err() {
                    tracing::warn!(layer, "replayed drop of unknown layer");
                }
            }
            Mutation::PutRecord { layer, key, body } => {
                let (target, _) = self.get_or_create(layer)?;
                target.put(key, body, now);
            }
            Mutation::DeleteRecord { layer, key } => match self.get(layer) {
                Ok(target) => {
                    target.delete(key, now);
                }
                Err(_) => {
                    tracing::warn!(layer, key, "replayed delete in unknown layer");
                }
            },
        }
        Ok(())
    }

    /// The whole store as a mutation stream: one `CreateLayer` per layer
    /// followed by one `PutRecord` per record, in deterministic order.
    /// Applying it to an empty registry rebuilds the same state.
    pub fn snapshot(&self) -> Vec<Mutation> {
        let layers: Vec<Arc<Layer>> = {
            let guard = self.layers.read().expect("lock poisoned");
            guard.values().cloned().collect()
        };
        let mut sorted: Vec<&Arc<Layer>> = layers.iter().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));

        let mut out = Vec::new();
        for layer in sorted {
            out.push(Mutation::CreateLayer {
                layer: layer.name().to_string(),
            });
            for record in layer.dump() {
                out.push(Mutation::PutRecord {
                    layer: layer.name().to_string(),
                    key: record.key.clone(),
                    body: put_request_for(&record),
                });
            }
        }
        out
    }
}

impl std::fmt::Debug for LayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layers = self.layers.read().expect("lock poisoned");
        f.debug_struct("LayerRegistry")
            .field("layers", &layers.len())
            .finish()
    }
}

/// A PUT body that recreates `record` from scratch.
fn put_request_for(record: &Record) -> PutRequest {
    PutRequest {
        position: record.position,
        expires_at: record.expires_at,
        sets: record.properties.clone(),
        ..PutRequest::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_types::Position;
    use serde_json::json;

    fn registry() -> LayerRegistry {
        LayerRegistry::new(StoreConfig::default())
    }

    fn put_key(reg: &LayerRegistry, layer: &str, key: &str, position: Option<Position>) {
        let (target, _) = reg.get_or_create(layer).unwrap();
        target.put(
            key,
            &PutRequest {
                position,
                ..PutRequest::default()
            },
            0,
        );
    }

    // ---- lifecycle ----

    #[test]
    fn create_is_idempotent() {
        let reg = registry();
        assert_eq!(reg.create("cities").unwrap(), CreateOutcome::Created);
        assert_eq!(reg.create("cities").unwrap(), CreateOutcome::Existing);
        assert!(reg.contains("cities"));
    }

    #[test]
    fn create_rejects_bad_names() {
        let reg = registry();
        assert!(reg.create("").is_err());
        assert!(reg.create("with space").is_err());
        assert!(reg.create("a/b").is_err());
    }

    #[test]
    fn get_unknown_layer_fails() {
        let reg = registry();
        assert!(matches!(
            reg.get("nope"),
            Err(EngineError::LayerNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn drop_layer_removes_records_with_it() {
        let reg = registry();
        put_key(&reg, "cities", "paris", None);
        reg.drop_layer("cities").unwrap();
        assert!(reg.get("cities").is_err());
        assert!(reg.drop_layer("cities").is_err());
    }

    #[test]
    fn layers_are_isolated() {
        let reg = registry();
        put_key(&reg, "cities", "paris", Some(Position::new(48.85, 2.35)));
        put_key(&reg, "towns", "paris", None);

        let cities = reg.get("cities").unwrap();
        let towns = reg.get("towns").unwrap();
        assert!(cities.get("paris", 0).unwrap().position.is_some());
        assert!(towns.get("paris", 0).unwrap().position.is_none());

        cities.delete("paris", 0);
        assert!(towns.get("paris", 0).is_some());
    }

    // ---- listing ----

    #[test]
    fn list_reports_stats_in_name_order() {
        let reg = registry();
        put_key(&reg, "b-layer", "k1", Some(Position::new(1.0, 1.0)));
        put_key(&reg, "b-layer", "k2", None);
        reg.create("a-layer").unwrap();

        let rows = reg.list();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a-layer");
        assert_eq!(rows[1].name, "b-layer");
        assert_eq!(rows[1].records, 2);
        assert_eq!(rows[1].geo_records, 1);
        assert_eq!(rows[1].kind, LayerKind::Geoidal);
        assert_eq!(rows[1].distance_accuracy, "fast");
        assert_eq!(rows[1].bounds, [-180.0, -180.0, 180.0, 180.0]);
    }

    #[test]
    fn list_row_serializes_kind_as_type() {
        let reg = registry();
        reg.create("cities").unwrap();
        let rows = reg.list();
        let value = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(value["type"], json!("geoidal"));
        assert_eq!(value["distance_accuracy"], json!("fast"));
    }

    // ---- replay / snapshot ----

    #[test]
    fn apply_covers_every_mutation() {
        let reg = registry();
        reg.apply(
            &Mutation::CreateLayer {
                layer: "cities".into(),
            },
            0,
        )
        .unwrap();
        reg.apply(
            &Mutation::PutRecord {
                layer: "cities".into(),
                key: "paris".into(),
                body: PutRequest {
                    position: Some(Position::new(48.85, 2.35)),
                    ..PutRequest::default()
                },
            },
            0,
        )
        .unwrap();
        assert!(reg.get("cities").unwrap().get("paris", 0).is_some());

        reg.apply(
            &Mutation::DeleteRecord {
                layer: "cities".into(),
                key: "paris".into(),
            },
            0,
        )
        .unwrap();
        assert!(reg.get("cities").unwrap().get("paris", 0).is_none());

        reg.apply(
            &Mutation::DropLayer {
                layer: "cities".into(),
            },
            0,
        )
        .unwrap();
        assert!(!reg.contains("cities"));
    }

    #[test]
    fn apply_tolerates_stale_mutations() {
        let reg = registry();
        reg.apply(&Mutation::DropLayer { layer: "gone".into() }, 0).unwrap();
        reg.apply(
            &Mutation::DeleteRecord {
                layer: "gone".into(),
                key: "k".into(),
            },
            0,
        )
        .unwrap();
        // A replayed put lands even when the create was lost.
        reg.apply(
            &Mutation::PutRecord {
                layer: "implicit".into(),
                key: "k".into(),
                body: PutRequest::default(),
            },
            0,
        )
        .unwrap();
        assert!(reg.contains("implicit"));
    }

    #[test]
    fn snapshot_rebuilds_identical_state() {
        let reg = registry();
        put_key(&reg, "cities", "paris", Some(Position::new(48.85, 2.35)));
        let (cities, _) = reg.get_or_create("cities").unwrap();
        cities.put(
            "tokyo",
            &PutRequest {
                position: Some(Position::new(35.68, 139.69)),
                expires_at: Some(9_999),
                sets: [("pop".to_string(), json!(14_000_000))].into_iter().collect(),
                ..PutRequest::default()
            },
            0,
        );
        reg.create("empty").unwrap();

        let snapshot = reg.snapshot();
        let rebuilt = registry();
        for mutation in &snapshot {
            rebuilt.apply(mutation, 0).unwrap();
        }

        assert_eq!(rebuilt.list().len(), 2);
        let layer = rebuilt.get("cities").unwrap();
        assert_eq!(layer.stats(), (2, 2));
        let tokyo = layer.get("tokyo", 0).unwrap();
        assert_eq!(tokyo.expires_at, Some(9_999));
        assert_eq!(tokyo.properties["pop"], json!(14_000_000));
        assert_eq!(rebuilt.snapshot(), snapshot);
    }
}
