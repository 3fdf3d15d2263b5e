use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

use carto_engine::{LayerRegistry, TidStamper};
use carto_journal::{Journal, SyncMode};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::build_router;
use crate::state::{now_epoch, AppState};

/// The carto server: boots the store from the journal, serves the REST
/// surface, and drains gracefully on SIGINT/SIGTERM or `system/shutdown`.
pub struct CartoServer {
    config: ServerConfig,
}

impl CartoServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Replay the journal, bind, and serve until shutdown. The journal is
    /// flushed one last time after the drain completes.
    pub async fn serve(self) -> ServerResult<()> {
        let state = bootstrap(&self.config)?;
        spawn_background_tasks(&state, self.config.journal.sync_mode());

        let app = build_router(state.clone());
        let listener = TcpListener::bind(self.config.server.listen).await?;
        tracing::info!("carto listening on {}", self.config.server.listen);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(state.subscribe_shutdown()))
            .await?;

        if let Some(journal) = state.journal() {
            journal.sync()?;
        }
        tracing::info!("carto stopped");
        Ok(())
    }
}

/// Build the shared state: open the journal when configured, replay it
/// into a fresh registry, and resume the stamper above the highest
/// replayed tid.
pub fn bootstrap(config: &ServerConfig) -> ServerResult<AppState> {
    let registry = Arc::new(LayerRegistry::new(config.store.clone()));
    let stamper = Arc::new(TidStamper::new());

    let journal = match &config.journal.path {
        Some(path) => {
            let journal = Journal::open(path, config.journal.sync_mode())?;
            let entries = journal.recover()?;
            let replayed = entries.len();
            for entry in entries {
                stamper.observe(entry.tid);
                if let Err(e) = registry.apply(&entry.op, entry.at) {
                    tracing::warn!(tid = entry.tid, error = %e, "skipped journal entry on replay");
                }
            }
            tracing::info!(replayed, path = %path.display(), "journal replayed");
            Some(Arc::new(journal))
        }
        None => {
            tracing::warn!("no journal path configured; the store is volatile");
            None
        }
    };

    Ok(AppState::new(registry, stamper, journal))
}

/// Expiry sweeper (every second) and, under periodic sync, the journal
/// flush task. Both stop when shutdown is signalled.
fn spawn_background_tasks(state: &AppState, sync_mode: SyncMode) {
    let sweeper = state.clone();
    let mut shutdown = state.subscribe_shutdown();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let purged = sweeper.registry().purge_expired(now_epoch());
                    if purged > 0 {
                        tracing::debug!(purged, "expired records swept");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });

    if let (Some(journal), SyncMode::Periodic(period)) = (state.journal(), sync_mode) {
        let mut shutdown = state.subscribe_shutdown();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = journal.sync() {
                            tracing::error!(error = %e, "periodic journal sync failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}

/// Resolves when the process should stop: SIGINT, SIGTERM, or the
/// `system/shutdown` endpoint.
async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "interrupt handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "terminate handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("interrupt received; draining"),
        _ = terminate => tracing::info!("terminate received; draining"),
        _ = shutdown.changed() => tracing::info!("shutdown requested; draining"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carto_engine::{Mutation, PutRequest};
    use carto_journal::JournalEntry;
    use carto_types::Position;

    #[test]
    fn server_construction() {
        let server = CartoServer::new(ServerConfig::default());
        assert_eq!(
            server.config().server.listen,
            "0.0.0.0:4269".parse().unwrap()
        );
    }

    #[test]
    fn bootstrap_without_journal_is_volatile() {
        let state = bootstrap(&ServerConfig::default()).unwrap();
        assert!(state.journal().is_none());
        assert_eq!(state.stamper().current(), 0);
    }

    #[test]
    fn bootstrap_replays_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.journal");

        // Seed a journal by hand: create a layer, put a record.
        let journal = Journal::open(&path, SyncMode::EveryWrite).unwrap();
        journal
            .append(&JournalEntry {
                tid: 5,
                at: 0,
                op: Mutation::CreateLayer {
                    layer: "cities".into(),
                },
            })
            .unwrap();
        journal
            .append(&JournalEntry {
                tid: 9,
                at: 0,
                op: Mutation::PutRecord {
                    layer: "cities".into(),
                    key: "paris".into(),
                    body: PutRequest {
                        position: Some(Position::new(48.85, 2.35)),
                        ..PutRequest::default()
                    },
                },
            })
            .unwrap();
        drop(journal);

        let mut config = ServerConfig::default();
        config.journal.path = Some(path);
        let state = bootstrap(&config).unwrap();

        let layer = state.registry().get("cities").unwrap();
        let record = layer.get("paris", 0).unwrap();
        assert_eq!(record.position, Some(Position::new(48.85, 2.35)));

        // The stamper resumes above the highest replayed tid.
        assert_eq!(state.stamper().current(), 9);
        assert_eq!(state.next_tid(), 10);
    }
}
