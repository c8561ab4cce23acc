//! LSP protocol handler implementations
//!
//! This module contains the `tower_lsp::LanguageServer` trait implementation
//! for the markdown backend:
//! - Lifecycle handlers (initialize, initialized, shutdown)
//! - Document lifecycle (did_open, did_change, did_close)
//! - Completion

use std::sync::Arc;

use tower_lsp::{LanguageServer, jsonrpc};
use tower_lsp::lsp_types::{
    CompletionItem, CompletionOptions, CompletionParams, CompletionResponse,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    InitializeParams, InitializeResult, InitializedParams, MessageType, ServerCapabilities,
    ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
};
use tower_lsp::jsonrpc::Result as LspResult;

use tracing::{debug, info, warn};

use crate::candidates::TRIGGER;
use crate::lsp::models::LspDocument;

use super::state::MarkdownBackend;

#[tower_lsp::async_trait]
impl LanguageServer for MarkdownBackend {
    /// Handles the LSP initialize request, recording the workspace root and options.
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        info!("Received initialize: process_id={:?}", params.process_id);

        self.config
            .write()
            .await
            .apply_initialization_options(params.initialization_options.as_ref());

        #[allow(deprecated)]
        let root_uri = params.root_uri.or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first())
                .map(|folder| folder.uri.clone())
        });

        if let Some(root_uri) = root_uri {
            match root_uri.to_file_path() {
                Ok(root_path) => {
                    info!("Workspace root: {:?}", root_path);
                    *self.root_dir.write().await = Some(root_path);
                }
                Err(()) => {
                    warn!("Failed to convert root_uri to path: {}. Skipping workspace scan.", root_uri);
                }
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![TRIGGER.to_string()]),
                    all_commit_characters: None,
                    resolve_provider: Some(false),
                    completion_item: None,
                    work_done_progress_options: Default::default(),
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    /// Handles the LSP initialized notification by seeding the heading index.
    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Markdown heading server initialized")
            .await;

        let backend = self.clone();
        tokio::spawn(async move {
            backend.seed_workspace().await;
        });
    }

    /// Handles the LSP shutdown request.
    async fn shutdown(&self) -> jsonrpc::Result<()> {
        info!("Received shutdown request");

        self.flush_persistence().await;

        // Signal all background tasks to shut down gracefully
        let _ = self.shutdown_tx.send(());
        info!("Shutdown signal sent to all background tasks");

        Ok(())
    }

    /// Tracks an opened document. Opening alone does not index it.
    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        info!("Opening document: URI={}, version={}", params.text_document.uri, params.text_document.version);
        let uri = params.text_document.uri;
        let document = Arc::new(LspDocument::new(
            self.next_document_id(),
            &params.text_document.text,
            params.text_document.version,
        ));
        self.documents_by_uri.insert(uri, document);
    }

    /// Applies edits and re-scans the whole changed document.
    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        debug!("textDocument/didChange: URI={}, version={}", uri, version);

        // DashMap::get returns a guard that dereferences to the value
        let Some(document) = self.documents_by_uri.get(&uri).map(|r| r.value().clone()) else {
            warn!("Failed to find document with URI={}", uri);
            return;
        };

        match document.apply(params.content_changes, version).await {
            Some(text) => self.index_changed_document(&uri, &text).await,
            None => warn!("Failed to apply changes to document with URI={}", uri),
        }
    }

    /// Forgets a closed document. Its candidates stay in the store.
    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some((_key, document)) = self.documents_by_uri.remove(&uri) {
            info!("Closed document: {}, id: {}", uri, document.id);
        } else {
            warn!("Failed to find document with URI={}", uri);
        }
    }

    /// Offers every known heading when the current line contains `#`.
    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        debug!("Completion request at {}:{:?}", uri, position);

        let Some(document) = self.documents_by_uri.get(&uri).map(|r| r.value().clone()) else {
            debug!("Document not found: {}", uri);
            return Ok(None);
        };

        let Some(line) = document.line(position.line as usize).await else {
            debug!("Line {} out of range in {}", position.line, uri);
            return Ok(None);
        };

        let completions: Vec<CompletionItem> = self
            .index
            .completions(&line)
            .into_iter()
            .map(CompletionItem::from)
            .collect();

        debug!("Returning {} completion items", completions.len());

        if completions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CompletionResponse::Array(completions)))
        }
    }
}
