//! Infrastructure layer: persistence adapters for the authorization core.

pub mod directory;

pub use directory::{InMemoryDirectoryStore, PostgresDirectoryStore};
