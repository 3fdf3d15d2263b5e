use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use carto_engine::StoreConfig;
use carto_journal::SyncMode;

use crate::error::{ServerError, ServerResult};

/// Top-level configuration, loaded from a TOML file. Every field has a
/// default, so an empty file (or a missing section) gives a working server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ListenConfig,
    pub store: StoreConfig,
    pub journal: JournalConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub listen: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4269".parse().unwrap(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Journal file path. Absent means no persistence: the store is
    /// volatile and `system/rewrite` is unavailable.
    pub path: Option<PathBuf>,
    /// Seconds between fsyncs. `0` syncs after every append.
    pub fsync_period: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: None,
            fsync_period: 5,
        }
    }
}

impl JournalConfig {
    pub fn sync_mode(&self) -> SyncMode {
        match self.fsync_period {
            0 => SyncMode::EveryWrite,
            n => SyncMode::Periodic(Duration::from_secs(n)),
        }
    }
}

impl ServerConfig {
    /// Load and parse the configuration file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_types::{DistanceFormula, LayerKind};

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.server.listen, "0.0.0.0:4269".parse::<SocketAddr>().unwrap());
        assert!(c.journal.path.is_none());
        assert_eq!(c.journal.fsync_period, 5);
        assert!(c.store.auto_create_layers);
    }

    #[test]
    fn empty_toml_is_a_working_config() {
        let c: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(c.server.listen, ServerConfig::default().server.listen);
    }

    #[test]
    fn sample_config_parses() {
        let c: ServerConfig = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:8080"

            [store]
            auto_create_layers = false
            default_layer_type = "spherical"
            default_accuracy = "haversine"
            bucket_size = 8
            dimension_accuracy = 0.01

            [journal]
            path = "/tmp/carto.journal"
            fsync_period = 0
            "#,
        )
        .unwrap();

        assert_eq!(c.server.listen, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert!(!c.store.auto_create_layers);
        assert_eq!(c.store.default_layer_type, LayerKind::Spherical);
        assert_eq!(c.store.default_accuracy, DistanceFormula::Haversine);
        assert_eq!(c.store.bucket_size, 8);
        assert_eq!(c.journal.path, Some(PathBuf::from("/tmp/carto.journal")));
        assert_eq!(c.journal.sync_mode(), SyncMode::EveryWrite);
    }

    #[test]
    fn periodic_sync_mode() {
        let c = JournalConfig {
            path: None,
            fsync_period: 2,
        };
        assert_eq!(c.sync_mode(), SyncMode::Periodic(Duration::from_secs(2)));
    }
}
