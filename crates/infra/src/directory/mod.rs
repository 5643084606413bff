//! Directory store adapters (users, organizations, memberships).

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDirectoryStore;
pub use postgres::PostgresDirectoryStore;
