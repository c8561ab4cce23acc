//! Durable storage of the candidate store across sessions.

pub mod bridge;
pub mod kv;

use thiserror::Error;

pub use bridge::{load, save, PersistenceBridge, DEFAULT_STORAGE_KEY};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O failed for key `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    #[error("failed to encode candidate store: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode persisted candidate store: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
