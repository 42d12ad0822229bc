//! Session File Watcher - Token Rotation Without Restart
//!
//! Periodically re-reads the session file. When its contents change
//! (re-login, refresh by another process) the store is reloaded and the
//! price stream is told to pick up the new token.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::store::SessionStore;
use crate::usecases::PriceStreamClient;

/// Polls a session file and pushes token changes to the stream client.
///
/// Polling rather than a filesystem watcher, which has portability
/// issues across Linux/macOS/Docker volumes.
pub struct TokenWatcher {
    /// Path to the session JSON file.
    path: PathBuf,
    /// Poll period.
    interval: Duration,
    /// Store to reload.
    store: Arc<SessionStore>,
    /// Client to notify.
    client: Arc<PriceStreamClient>,
    /// Hash of the last seen contents.
    last_hash: Option<u64>,
}

impl TokenWatcher {
    /// Create a watcher. The current file contents are treated as
    /// already applied.
    pub fn new(
        path: PathBuf,
        interval: Duration,
        store: Arc<SessionStore>,
        client: Arc<PriceStreamClient>,
    ) -> Self {
        Self {
            path,
            interval,
            store,
            client,
            last_hash: None,
        }
    }

    /// Run the poll loop until shutdown.
    #[instrument(skip(self, shutdown_rx), fields(path = %self.path.display()))]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Session watcher started"
        );

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Session watcher shutting down");
                    return;
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Reload the session and refresh the stream if the file changed.
    ///
    /// Returns true when a change was applied.
    pub async fn check_and_reload(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Session file unchanged");
            return false;
        }

        if new_hash.is_none() {
            warn!("Session file disappeared, keeping current session");
            self.last_hash = None;
            return false;
        }

        if let Err(e) = self.store.load_file(&self.path) {
            warn!(error = %e, "Failed to reload session, keeping current");
            return false;
        }
        self.last_hash = new_hash;
        info!("Session file changed, refreshing price stream token");

        if let Err(e) = self.client.update_auth_token().await {
            warn!(error = %e, "Price stream could not switch to the new token");
        }
        true
    }

    /// Hash of the file contents, `None` if unreadable.
    async fn compute_hash(&self) -> Option<u64> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}
