use serde::{Deserialize, Serialize};

use carto_index::IndexConfig;
use carto_types::{DistanceFormula, Geometry, LayerKind};

/// Store-wide tuning applied to every new layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Whether a record PUT against an unknown layer creates the layer.
    /// Reads and deletes never create layers.
    pub auto_create_layers: bool,
    pub default_layer_type: LayerKind,
    pub default_accuracy: DistanceFormula,
    /// Spatial index bucket capacity before a cell splits.
    pub bucket_size: usize,
    /// Minimum spatial index cell span, in degrees.
    pub dimension_accuracy: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auto_create_layers: true,
            default_layer_type: LayerKind::Geoidal,
            default_accuracy: DistanceFormula::Fast,
            bucket_size: 50,
            dimension_accuracy: 0.001,
        }
    }
}

impl StoreConfig {
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.default_layer_type, self.default_accuracy)
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            bucket_capacity: self.bucket_size,
            latitude_accuracy: self.dimension_accuracy,
            longitude_accuracy: self.dimension_accuracy,
        }
    }
}
