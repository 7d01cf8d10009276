//! recipe-store - Parent registry, SQLite snapshot and search backends
//!
//! This crate owns everything built during the exclusive corpus load phase:
//! the parent/fragment registry, the on-disk SQLite snapshot with its FTS5
//! keyword index, the in-memory vector index, and the swappable
//! [`CorpusHandle`] that queries read from.

mod analyzer;
mod corpus;
mod registry;
mod schema;
mod sqlite;
mod vector;

pub use analyzer::{index_terms, match_expression};
pub use corpus::{build_registry, fingerprint, Corpus, CorpusHandle};
pub use registry::ParentRegistry;
pub use sqlite::{SnapshotMeta, SqliteStore};
pub use vector::FlatVectorIndex;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
