//! Persistence scheduling for the LSP backend
//!
//! Every change writes the entire store, and every write goes through a
//! single writer task, so writes never overlap and the last one carries the
//! latest state. With a zero debounce window a change waits until its write
//! is done. Otherwise the writer waits until no change arrived for the window.
//! Pending writes are flushed on shutdown and when the backend is dropped.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::workspace::HeadingIndex;

use super::state::{MarkdownBackend, PersistRequest};

impl MarkdownBackend {
    /// Requests a write of the whole store after a change.
    pub(super) async fn schedule_persist(&self) {
        let debounce = self.config.read().await.persist_debounce;
        if !debounce.is_zero() {
            if let Err(e) = self.persist_tx.send(PersistRequest::Schedule).await {
                error!("Failed to schedule candidate store write: {}", e);
            }
            return;
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.persist_tx.send(PersistRequest::Now(done_tx)).await.is_err() {
            error!("Persistence writer is gone; candidate store not written");
            return;
        }
        let _ = done_rx.await;
    }

    /// Writes any pending change and waits for it to finish.
    pub async fn flush_persistence(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.persist_tx.send(PersistRequest::Flush(done_tx)).await.is_err() {
            warn!("Persistence writer is gone; nothing to flush");
            return;
        }
        let _ = done_rx.await;
    }
}

async fn persist_now(index: &HeadingIndex) {
    match index.persist().await {
        Ok(()) => trace!("Candidate store written"),
        Err(e) => error!("Failed to write candidate store: {}", e),
    }
}

/// Spawns the task that performs every store write, in request order.
///
/// The task ends on the shutdown signal or once every request sender is
/// dropped, writing any pending change first.
pub(super) fn spawn_persistence_writer(
    index: HeadingIndex,
    config: Arc<RwLock<ServerConfig>>,
    mut persist_rx: mpsc::Receiver<PersistRequest>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                request = persist_rx.recv() => match request {
                    Some(PersistRequest::Schedule) => {
                        let debounce = config.read().await.persist_debounce;
                        deadline = Some(Instant::now() + debounce);
                    }
                    Some(PersistRequest::Now(done)) => {
                        deadline = None;
                        persist_now(&index).await;
                        let _ = done.send(());
                    }
                    Some(PersistRequest::Flush(done)) => {
                        if deadline.take().is_some() {
                            persist_now(&index).await;
                        }
                        let _ = done.send(());
                    }
                    None => {
                        if deadline.take().is_some() {
                            debug!("Writing pending candidate store before the writer stops");
                            persist_now(&index).await;
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    persist_now(&index).await;
                }
                _ = shutdown_rx.recv() => {
                    if deadline.take().is_some() {
                        debug!("Writing pending candidate store before shutdown");
                        persist_now(&index).await;
                    }
                    info!("Persistence writer received shutdown signal");
                    break;
                }
            }
        }

        info!("Persistence writer task terminated");
    })
}
