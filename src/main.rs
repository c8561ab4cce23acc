use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::info;

use markdown_heading_server::config::ServerConfig;
use markdown_heading_server::logging::init_logger;
use markdown_heading_server::lsp::backend::MarkdownBackend;
use markdown_heading_server::persistence::{FileKeyValueStore, PersistenceBridge};
use markdown_heading_server::workspace::HeadingIndex;

#[derive(Parser, Debug)]
#[command(name = "markdown-heading-server", version, about)]
struct Args {
    /// Communicate over stdin/stdout (the only supported transport)
    #[arg(long)]
    stdio: bool,
    /// Log level for stderr, e.g. "debug" or "markdown_heading_server=trace"
    #[arg(long)]
    log_level: Option<String>,
    /// Disable ANSI colors on stderr
    #[arg(long)]
    no_color: bool,
    /// Do not write a session log file
    #[arg(long)]
    no_file_log: bool,
    /// Directory of the persisted candidate store
    #[arg(long)]
    storage_dir: Option<PathBuf>,
    /// Key the candidate store is persisted under
    #[arg(long)]
    storage_key: Option<String>,
    /// Quiet period in milliseconds before the store is written
    #[arg(long)]
    persist_debounce_ms: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(dir) = &self.storage_dir {
            config.storage_dir = dir.clone();
        }
        if let Some(key) = &self.storage_key {
            config.storage_key = key.clone();
        }
        if let Some(ms) = self.persist_debounce_ms {
            config.persist_debounce = Duration::from_millis(ms);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _guard = init_logger(args.no_color, args.log_level.as_deref(), !args.no_file_log)
        .context("failed to initialize logging")?;

    let mut config = ServerConfig::from_env();
    args.apply(&mut config);
    info!(
        "Starting {} {} (storage: {:?}, key: {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.storage_dir,
        config.storage_key
    );
    if !args.stdio {
        info!("No transport flag given; using stdio");
    }

    let kv = FileKeyValueStore::open(config.storage_dir.clone())
        .await
        .with_context(|| format!("failed to open storage directory {:?}", config.storage_dir))?;
    let bridge = PersistenceBridge::new(Arc::new(kv), config.storage_key.clone());
    let index = HeadingIndex::new(bridge);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| MarkdownBackend::new(client, config, index));

    Server::new(stdin, stdout, socket)
        .serve(service)
        .await;

    info!("Server stopped");
    Ok(())
}
