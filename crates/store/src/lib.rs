//! Storage backends for openloop.
//!
//! | Backend | Persistence | Use |
//! |---------|-------------|-----|
//! | [`SqliteStore`] | single SQLite file, FTS5 over memories | the default |
//! | [`InMemoryStore`] | none | tests and throwaway sessions |

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
