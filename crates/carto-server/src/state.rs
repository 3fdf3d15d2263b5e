use std::sync::Arc;

use tokio::sync::watch;

use carto_engine::{LayerRegistry, Mutation, TidStamper};
use carto_journal::{Journal, JournalEntry};

use crate::error::ApiError;

/// Shared application state, cloned into every handler.
///
/// Holds the layer registry, the tid stamper, the journal (when
/// persistence is configured), and the shutdown signal. All of it is
/// injected at boot; nothing here is a process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<LayerRegistry>,
    stamper: Arc<TidStamper>,
    journal: Option<Arc<Journal>>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        registry: Arc<LayerRegistry>,
        stamper: Arc<TidStamper>,
        journal: Option<Arc<Journal>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            stamper,
            journal,
            shutdown,
        }
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    pub fn stamper(&self) -> &TidStamper {
        &self.stamper
    }

    /// Draw the tid for one routed operation.
    pub fn next_tid(&self) -> u64 {
        self.stamper.next()
    }

    pub fn journal(&self) -> Option<Arc<Journal>> {
        self.journal.clone()
    }

    /// Append an accepted mutation to the journal. A missing journal means
    /// the store is volatile and the mutation is simply not logged.
    pub fn log_mutation(&self, tid: u64, at: i64, op: Mutation) -> Result<(), ApiError> {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&JournalEntry { tid, at, op }) {
                tracing::error!(tid, error = %e, "journal append failed");
                return Err(ApiError::internal(tid));
            }
        }
        Ok(())
    }

    /// Ask the server to drain and stop.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// Wall-clock seconds since the epoch, the time base for expiry and
/// journal entry stamps.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
