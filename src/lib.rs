pub mod candidates;
pub mod completion;
pub mod config;
pub mod logging;
pub mod lsp;
pub mod persistence;
pub mod workspace;
