//! Backend state management
//!
//! This module defines the MarkdownBackend struct, which holds all state of
//! the LSP server: open documents, the heading index and background task
//! channels.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tower_lsp::Client;
use tower_lsp::lsp_types::Url;

use crate::config::ServerConfig;
use crate::lsp::models::LspDocument;
use crate::workspace::HeadingIndex;

/// Request to the persistence debouncer
#[derive(Debug)]
pub(super) enum PersistRequest {
    /// The store changed; write it once the debounce window is quiet
    Schedule,
    /// The store changed; write it now, then acknowledge
    Now(tokio::sync::oneshot::Sender<()>),
    /// Write now if anything is pending, then acknowledge
    Flush(tokio::sync::oneshot::Sender<()>),
}

/// Workspace change event for hot observable pattern
///
/// Broadcast to all subscribers when the heading index changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceChangeEvent {
    /// Number of files with a record in the store
    pub file_count: usize,
    /// Number of candidates across all files
    pub candidate_count: usize,
    /// Set once the initial workspace scan has been merged
    pub seeded: bool,
    /// Most recent change type
    pub change_type: WorkspaceChangeType,
}

/// Type of workspace change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceChangeType {
    /// Server created, nothing scanned yet
    Initialized,
    /// Workspace scan and persisted state merged into the store
    Seeded,
    /// A changed document was re-scanned
    FileIndexed,
}

/// The markdown heading language server backend.
#[derive(Clone)]
pub struct MarkdownBackend {
    pub(super) client: Client,
    pub(super) documents_by_uri: Arc<DashMap<Url, Arc<LspDocument>>>,
    pub(super) serial_document_id: Arc<AtomicU32>,
    pub(super) index: HeadingIndex,
    pub(super) config: Arc<RwLock<ServerConfig>>,
    pub(super) root_dir: Arc<RwLock<Option<PathBuf>>>,
    pub(super) persist_tx: tokio::sync::mpsc::Sender<PersistRequest>,
    pub(super) shutdown_tx: Arc<tokio::sync::broadcast::Sender<()>>,
    /// Hot observable for workspace changes
    pub(super) workspace_changes: Arc<tokio::sync::watch::Sender<WorkspaceChangeEvent>>,
}

impl std::fmt::Debug for MarkdownBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownBackend")
            .field("documents_count", &self.documents_by_uri.len())
            .field("index", &self.index)
            .finish()
    }
}
