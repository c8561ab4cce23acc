//! Server configuration
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults
//! 2. Environment (`MARKDOWN_HEADING_STORAGE_DIR`, `MARKDOWN_HEADING_DEBOUNCE_MS`)
//! 3. Command line flags
//! 4. LSP `initializationOptions` (debounce and extensions only; storage is
//!    fixed before the server starts)

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::persistence::{FileKeyValueStore, DEFAULT_STORAGE_KEY};

pub const STORAGE_DIR_ENV: &str = "MARKDOWN_HEADING_STORAGE_DIR";
pub const DEBOUNCE_ENV: &str = "MARKDOWN_HEADING_DEBOUNCE_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Directory of the durable key/value store
    pub storage_dir: PathBuf,
    /// Key the candidate store is persisted under
    pub storage_key: String,
    /// Quiet period before the store is written; zero writes after every change
    pub persist_debounce: Duration,
    /// File extensions treated as markdown, without the leading dot
    pub markdown_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_dir: FileKeyValueStore::default_dir(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            persist_debounce: Duration::ZERO,
            markdown_extensions: vec!["md".to_string()],
        }
    }
}

/// Options a client may send in `initialize`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializationOptions {
    pub persist_debounce_ms: Option<u64>,
    pub markdown_extensions: Option<Vec<String>>,
}

impl ServerConfig {
    /// Defaults overridden by the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(STORAGE_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.storage_dir = PathBuf::from(dir);
            }
        }

        if let Ok(ms) = std::env::var(DEBOUNCE_ENV) {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.persist_debounce = Duration::from_millis(ms),
                Err(e) => warn!("Ignoring invalid {}={:?}: {}", DEBOUNCE_ENV, ms, e),
            }
        }

        config
    }

    /// Applies `initializationOptions`; malformed options are logged and ignored.
    pub fn apply_initialization_options(&mut self, options: Option<&serde_json::Value>) {
        let Some(value) = options else {
            return;
        };

        let options = match InitializationOptions::deserialize(value) {
            Ok(options) => options,
            Err(e) => {
                warn!("Ignoring malformed initializationOptions: {}", e);
                return;
            }
        };

        if let Some(ms) = options.persist_debounce_ms {
            self.persist_debounce = Duration::from_millis(ms);
        }

        if let Some(extensions) = options.markdown_extensions {
            let extensions: Vec<String> = extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect();
            if extensions.is_empty() {
                warn!("Ignoring empty markdownExtensions");
            } else {
                self.markdown_extensions = extensions;
            }
        }
    }
}
