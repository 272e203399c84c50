//! Folio configuration module
//! Handles loading, saving, and resolving the config file

pub mod config;

pub use config::{ChatConfig, Config, ExecutionConfig, StorageConfig};
