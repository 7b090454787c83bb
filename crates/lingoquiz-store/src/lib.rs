//! lingoquiz-store: Collaborator implementations and engine configuration.
//!
//! Provides an in-memory store for tests and embedding, a JSON-file store
//! backed by a data directory, and the `lingoquiz.toml` configuration loader.

pub mod config;
pub mod error;
pub mod file;
pub mod memory;

pub use config::{load_config, load_config_from, EngineConfig};
pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
