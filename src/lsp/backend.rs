use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};

use crate::candidates::FileId;
use crate::config::ServerConfig;
use crate::workspace::HeadingIndex;

// Import types from backend submodules
mod state;
mod persistence;
mod handlers;

pub use state::{MarkdownBackend, WorkspaceChangeEvent, WorkspaceChangeType};
use state::PersistRequest;

impl MarkdownBackend {
    /// Creates a new backend around `index`.
    ///
    /// Must be called inside a tokio runtime: the persistence writer is
    /// spawned here.
    pub fn new(client: Client, config: ServerConfig, index: HeadingIndex) -> Self {
        let (persist_tx, persist_rx) = tokio::sync::mpsc::channel::<PersistRequest>(100);
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
        let (workspace_tx, _workspace_rx) = tokio::sync::watch::channel(WorkspaceChangeEvent {
            file_count: 0,
            candidate_count: 0,
            seeded: false,
            change_type: WorkspaceChangeType::Initialized,
        });

        let config = Arc::new(RwLock::new(config));

        // The writer holds no sender, so it stops once the last backend clone is dropped
        persistence::spawn_persistence_writer(index.clone(), config.clone(), persist_rx, shutdown_rx);

        Self {
            client,
            documents_by_uri: Arc::new(DashMap::new()),
            serial_document_id: Arc::new(AtomicU32::new(0)),
            index,
            config,
            root_dir: Arc::new(RwLock::new(None)),
            persist_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            workspace_changes: Arc::new(workspace_tx),
        }
    }

    pub fn index(&self) -> &HeadingIndex {
        &self.index
    }

    /// Subscribes to workspace change events.
    pub fn subscribe_workspace_changes(&self) -> tokio::sync::watch::Receiver<WorkspaceChangeEvent> {
        self.workspace_changes.subscribe()
    }

    /// Waits until the initial workspace scan and persisted state are merged.
    pub async fn wait_until_seeded(&self) {
        let mut rx = self.subscribe_workspace_changes();
        if rx
            .wait_for(|event| event.seeded)
            .await
            .is_err()
        {
            warn!("Workspace change channel closed before seeding finished");
        }
    }

    /// Scans the workspace root (if any) and merges persisted records.
    pub(super) async fn seed_workspace(&self) {
        let root = self.root_dir.read().await.clone();
        let extensions = self.config.read().await.markdown_extensions.clone();

        match root {
            Some(root) => match self.index.seed(&root, &extensions).await {
                Ok(count) => info!("Seeded {} markdown files from {:?}", count, root),
                Err(e) => warn!("Workspace scan of {:?} failed: {}", root, e),
            },
            None => info!("No workspace root; skipping workspace scan"),
        }

        let restored = self.index.restore().await;
        debug!("Merged {} persisted file records", restored);

        self.publish_workspace_change(WorkspaceChangeType::Seeded);
    }

    /// Re-scans a changed document and schedules a store write.
    pub(super) async fn index_changed_document(&self, uri: &Url, text: &str) {
        // The record is stamped with the file's modification time; a document
        // that cannot be stat'ed is not indexed.
        let timestamp = match file_modification_time(uri).await {
            Ok(timestamp) => timestamp,
            Err(e) => {
                warn!("Skipping candidate update for {}: {}", uri, e);
                return;
            }
        };

        let record = self.index.on_document_changed(FileId::from_uri(uri), text, timestamp);
        debug!("Indexed {} candidates from {}", record.len(), uri);
        self.publish_workspace_change(WorkspaceChangeType::FileIndexed);

        self.schedule_persist().await;
    }

    fn publish_workspace_change(&self, change_type: WorkspaceChangeType) {
        let store = self.index.store();
        self.workspace_changes.send_modify(|event| {
            event.file_count = store.len();
            event.candidate_count = store.candidate_count();
            event.seeded |= change_type == WorkspaceChangeType::Seeded;
            event.change_type = change_type;
        });
    }

    /// Generates the next unique document ID.
    pub(super) fn next_document_id(&self) -> u32 {
        self.serial_document_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Get the current filesystem modification time for a document
async fn file_modification_time(uri: &Url) -> io::Result<SystemTime> {
    let path = uri.to_file_path().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Not a file URI: {}", uri),
        )
    })?;

    let metadata = tokio::fs::metadata(&path).await?;
    metadata.modified()
}
