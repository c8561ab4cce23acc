/// Integration tests for the language server backend
///
/// Tests drive `MarkdownBackend` in-process through the `LanguageServer`
/// trait, against a temporary workspace and a temporary storage directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indoc::indoc;
use tempfile::TempDir;
use tower_lsp::{LanguageServer, LspService};
use tower_lsp::lsp_types::{
    ClientCapabilities, CompletionItem, CompletionParams, CompletionResponse,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    Documentation, InitializeParams, InitializedParams, PartialResultParams, Position, Range,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
    VersionedTextDocumentIdentifier, WorkDoneProgressParams,
};

use markdown_heading_server::candidates::FileRecord;
use markdown_heading_server::config::ServerConfig;
use markdown_heading_server::lsp::backend::MarkdownBackend;
use markdown_heading_server::persistence::{
    self, FileKeyValueStore, KeyValueStore, PersistenceBridge, DEFAULT_STORAGE_KEY,
};
use markdown_heading_server::workspace::HeadingIndex;

struct TestServer {
    service: LspService<MarkdownBackend>,
    workspace: TempDir,
    storage: TempDir,
}

impl TestServer {
    async fn start(persist_debounce: Duration) -> Self {
        Self::start_with_storage(tempfile::tempdir().unwrap(), persist_debounce).await
    }

    async fn start_with_storage(storage: TempDir, persist_debounce: Duration) -> Self {
        let workspace = tempfile::tempdir().unwrap();
        let kv = FileKeyValueStore::open(storage.path()).await.unwrap();
        let index = HeadingIndex::new(PersistenceBridge::new(Arc::new(kv), DEFAULT_STORAGE_KEY));
        let config = ServerConfig {
            storage_dir: storage.path().to_path_buf(),
            persist_debounce,
            ..ServerConfig::default()
        };

        let (service, _socket) = LspService::new(|client| MarkdownBackend::new(client, config, index));
        Self { service, workspace, storage }
    }

    fn backend(&self) -> &MarkdownBackend {
        self.service.inner()
    }

    fn write(&self, name: &str, text: &str) -> Url {
        let path = self.workspace.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        Url::from_file_path(&path).unwrap()
    }

    async fn initialize(&self) {
        #[allow(deprecated)]
        let params = InitializeParams {
            root_uri: Some(Url::from_file_path(self.workspace.path()).unwrap()),
            capabilities: ClientCapabilities::default(),
            ..Default::default()
        };
        self.backend().initialize(params).await.unwrap();
        self.backend().initialized(InitializedParams {}).await;

        tokio::time::timeout(Duration::from_secs(10), self.backend().wait_until_seeded())
            .await
            .expect("workspace seeding timed out");
    }

    async fn open(&self, uri: &Url, text: &str) {
        self.backend()
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: "markdown".to_string(),
                    version: 0,
                    text: text.to_string(),
                },
            })
            .await;
    }

    async fn insert(&self, uri: &Url, version: i32, at: Position, text: &str) {
        self.backend()
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri: uri.clone(), version },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: Some(Range { start: at, end: at }),
                    range_length: None,
                    text: text.to_string(),
                }],
            })
            .await;
    }

    async fn completion(&self, uri: &Url, line: u32) -> Vec<CompletionItem> {
        let response = self
            .backend()
            .completion(CompletionParams {
                text_document_position: TextDocumentPositionParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                    position: Position::new(line, 0),
                },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
                context: None,
            })
            .await
            .unwrap();

        match response {
            Some(CompletionResponse::Array(items)) => items,
            Some(CompletionResponse::List(list)) => list.items,
            None => Vec::new(),
        }
    }

    async fn persisted(&self) -> Option<Vec<FileRecord>> {
        read_persisted(self.storage.path()).await
    }
}

async fn read_persisted(dir: &Path) -> Option<Vec<FileRecord>> {
    let kv = FileKeyValueStore::open(dir).await.unwrap();
    let data = kv.get(DEFAULT_STORAGE_KEY).await.unwrap()?;
    Some(persistence::load(&data).unwrap())
}

fn labels(items: &[CompletionItem]) -> Vec<&str> {
    let mut labels: Vec<&str> = items.iter().map(|item| item.label.as_str()).collect();
    labels.sort_unstable();
    labels
}

#[tokio::test]
async fn test_initialize_advertises_hash_trigger() {
    let server = TestServer::start(Duration::ZERO).await;
    let result = server.backend().initialize(InitializeParams::default()).await.unwrap();

    let completion = result.capabilities.completion_provider.expect("completion provider");
    assert_eq!(completion.trigger_characters, Some(vec!["#".to_string()]));
    assert_eq!(completion.resolve_provider, Some(false));
    assert_eq!(
        result.capabilities.text_document_sync,
        Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL))
    );
}

#[tokio::test]
async fn test_completion_offers_workspace_headings() {
    let server = TestServer::start(Duration::ZERO).await;
    server.write("guide.md", indoc! {"
        # Title
        some text
        ## Sub
    "});
    server.write("notes/todo.md", "### Later\n");
    server.write("ignored.txt", "# Not markdown\n");
    server.initialize().await;

    let draft = server.write("draft.md", "# \nplain\n");
    server.open(&draft, "# \nplain\n").await;

    let items = server.completion(&draft, 0).await;
    assert_eq!(labels(&items), vec!["Later", "Sub", "Title"]);

    let title = items.iter().find(|item| item.label == "Title").unwrap();
    assert_eq!(title.insert_text.as_deref(), Some("Title"));
    let guide = server.workspace.path().join("guide.md");
    assert_eq!(
        title.documentation,
        Some(Documentation::String(guide.display().to_string()))
    );
    let command = title.command.as_ref().expect("re-trigger command");
    assert_eq!(command.command, "editor.action.triggerSuggest");
}

#[tokio::test]
async fn test_completion_requires_hash_on_current_line() {
    let server = TestServer::start(Duration::ZERO).await;
    server.write("guide.md", "# Title\n");
    server.initialize().await;

    let draft = server.write("draft.md", "# \nplain\n");
    server.open(&draft, "# \nplain\n").await;

    assert!(server.completion(&draft, 1).await.is_empty());
    assert!(server.completion(&draft, 40).await.is_empty());
}

#[tokio::test]
async fn test_change_reindexes_document_and_persists_store() {
    let server = TestServer::start(Duration::ZERO).await;
    server.write("guide.md", "# Title\n");
    let draft = server.write("draft.md", "intro\n");
    server.initialize().await;
    server.open(&draft, "intro\n").await;

    server.insert(&draft, 1, Position::new(1, 0), "## Fresh\n").await;

    let items = server.completion(&draft, 1).await;
    assert_eq!(labels(&items), vec!["Fresh", "Title"]);

    let persisted = server.persisted().await.expect("store should be written after a change");
    let record = persisted
        .iter()
        .find(|record| record.file.as_str() == draft.to_file_path().unwrap().display().to_string())
        .expect("record for the changed document");
    assert_eq!(record.candidates.len(), 1);
    assert_eq!(record.candidates[0].line_number, 1);
    assert_eq!(record.candidates[0].text, "Fresh");
    assert_eq!(persisted.len(), 2);
}

#[tokio::test]
async fn test_change_to_missing_file_is_not_indexed() {
    let server = TestServer::start(Duration::ZERO).await;
    server.initialize().await;

    let ghost = Url::from_file_path(server.workspace.path().join("ghost.md")).unwrap();
    server.open(&ghost, "").await;
    server.insert(&ghost, 1, Position::new(0, 0), "# Ghost").await;

    assert!(server.completion(&ghost, 0).await.is_empty());
    assert!(server.persisted().await.is_none());
}

#[tokio::test]
async fn test_close_keeps_candidates() {
    let server = TestServer::start(Duration::ZERO).await;
    let draft = server.write("draft.md", "");
    let other = server.write("other.md", "#\n");
    server.initialize().await;
    server.open(&draft, "").await;
    server.insert(&draft, 1, Position::new(0, 0), "# Kept").await;

    server
        .backend()
        .did_close(DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: draft.clone() },
        })
        .await;

    server.open(&other, "#\n").await;
    let items = server.completion(&other, 0).await;
    assert!(labels(&items).contains(&"Kept"));
    assert!(server.completion(&draft, 0).await.is_empty(), "closed document has no text");
}

#[tokio::test]
async fn test_debounced_writes_are_flushed_on_shutdown() {
    let server = TestServer::start(Duration::from_secs(60)).await;
    let draft = server.write("draft.md", "");
    server.initialize().await;
    server.open(&draft, "").await;
    server.insert(&draft, 1, Position::new(0, 0), "# Pending").await;

    assert!(server.persisted().await.is_none(), "write should wait for the debounce window");

    server.backend().shutdown().await.unwrap();

    let persisted = server.persisted().await.expect("shutdown should flush pending writes");
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].candidates[0].text, "Pending");
}

#[tokio::test]
async fn test_persisted_candidates_survive_restart() {
    let storage = tempfile::tempdir().unwrap();

    let first = TestServer::start_with_storage(storage, Duration::ZERO).await;
    let draft = first.write("draft.md", "");
    first.initialize().await;
    first.open(&draft, "").await;
    first.insert(&draft, 1, Position::new(0, 0), "# Remembered").await;
    first.backend().shutdown().await.unwrap();

    let TestServer { storage, .. } = first;

    // Fresh workspace: the only source of the candidate is the persisted store
    let second = TestServer::start_with_storage(storage, Duration::ZERO).await;
    let page = second.write("page.md", "#\n");
    second.initialize().await;
    second.open(&page, "#\n").await;

    let items = second.completion(&page, 0).await;
    assert_eq!(labels(&items), vec!["", "Remembered"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_changes_persist_every_document() {
    let server = TestServer::start(Duration::ZERO).await;
    let drafts: Vec<Url> = (0..8).map(|i| server.write(&format!("draft{}.md", i), "")).collect();
    server.initialize().await;
    for draft in &drafts {
        server.open(draft, "").await;
    }

    let mut tasks = Vec::new();
    for (i, draft) in drafts.iter().enumerate() {
        let backend = server.backend().clone();
        let draft = draft.clone();
        tasks.push(tokio::spawn(async move {
            backend
                .did_change(DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier { uri: draft, version: 1 },
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range: Some(Range::new(Position::new(0, 0), Position::new(0, 0))),
                        range_length: None,
                        text: format!("# Draft {}", i),
                    }],
                })
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let persisted = server.persisted().await.expect("store should be written");
    let mut texts: Vec<&str> = persisted
        .iter()
        .flat_map(|record| record.candidates.iter().map(|c| c.text.as_str()))
        .collect();
    texts.sort_unstable();
    let expected: Vec<String> = (0..8).map(|i| format!("Draft {}", i)).collect();
    assert_eq!(texts, expected.iter().map(String::as_str).collect::<Vec<_>>());
}
