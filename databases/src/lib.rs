//! Reprodesk Databases
//!
//! `Store` implementations: a durable SQLite store and an in-process store
//! used by tests and the simulation harness.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreStats};
