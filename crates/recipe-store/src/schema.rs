//! Snapshot schema definitions.

/// Main schema SQL for initializing a snapshot database.
pub const SCHEMA: &str = r#"
-- Snapshot metadata (schema version, fingerprint, embedding model)
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Parent recipes, in load order
CREATE TABLE IF NOT EXISTS parents (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    source TEXT NOT NULL,
    name TEXT NOT NULL,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    attributes TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_parents_position ON parents(position);

-- Fragments
CREATE TABLE IF NOT EXISTS fragments (
    id TEXT PRIMARY KEY,
    parent_id TEXT NOT NULL REFERENCES parents(id) ON DELETE CASCADE,
    fragment_index INTEGER NOT NULL,
    header_path TEXT NOT NULL DEFAULT '[]',
    content TEXT NOT NULL,
    attributes TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_fragments_parent ON fragments(parent_id, fragment_index);

-- Fragment embeddings, little-endian f32
CREATE TABLE IF NOT EXISTS embeddings (
    fragment_id TEXT PRIMARY KEY REFERENCES fragments(id) ON DELETE CASCADE,
    vector BLOB NOT NULL
);

-- FTS5 keyword index over pre-split terms
CREATE VIRTUAL TABLE IF NOT EXISTS fragments_fts USING fts5(
    fragment_id UNINDEXED,
    terms
);
"#;

/// Schema version. A snapshot with any other version is rebuilt.
pub const SCHEMA_VERSION: u32 = 1;
