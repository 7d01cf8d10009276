//! SQLite snapshot store and FTS5 keyword backend.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use recipe_core::{
    Attributes, Fragment, FragmentId, LexicalBackend, ParentId, Predicate, RankedCandidate,
    Recipe, RecipeError, Result,
};

use crate::analyzer::{index_terms, match_expression};
use crate::registry::ParentRegistry;
use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// Values recorded in the snapshot's `meta` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    /// Corpus fingerprint the snapshot was built from.
    pub fingerprint: String,

    /// Embedding model id.
    pub model_id: String,

    /// Embedding dimension.
    pub dimension: usize,
}

/// SQLite-backed corpus snapshot.
///
/// Holds a single connection behind a blocking Mutex. Queries are short
/// and read-only once the snapshot is written.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a snapshot at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RecipeError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RecipeError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RecipeError::database(format!("Failed to initialize schema: {}", e)))?;

        debug!("Snapshot database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        // Rollback journal keeps the snapshot a single file, so it can be
        // renamed into place once written.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = DELETE;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RecipeError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RecipeError::database(e.to_string()))?;
        f(&conn)
    }

    /// Write the registry, embeddings and metadata in one transaction.
    ///
    /// Meant for a freshly created file; existing rows are replaced.
    pub fn write_corpus(
        &self,
        registry: &ParentRegistry,
        embeddings: &[(FragmentId, Vec<f32>)],
        meta: &SnapshotMeta,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RecipeError::database(e.to_string()))?;

            tx.execute_batch(
                "DELETE FROM fragments_fts; DELETE FROM embeddings; DELETE FROM fragments; DELETE FROM parents; DELETE FROM meta;",
            )
            .map_err(|e| RecipeError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO parents (id, position, source, name, content, content_hash, attributes)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .map_err(|e| RecipeError::database(e.to_string()))?;

                for (position, parent) in registry.parents().enumerate() {
                    stmt.execute(params![
                        parent.id.as_str(),
                        position as i64,
                        parent.source,
                        parent.name,
                        parent.content,
                        parent.content_hash(),
                        serde_json::to_string(&parent.attributes)?,
                    ])
                    .map_err(|e| RecipeError::database(format!("Failed to insert parent: {}", e)))?;
                }
            }

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO fragments (id, parent_id, fragment_index, header_path, content, attributes)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                        "#,
                    )
                    .map_err(|e| RecipeError::database(e.to_string()))?;
                let mut fts = tx
                    .prepare("INSERT INTO fragments_fts (fragment_id, terms) VALUES (?1, ?2)")
                    .map_err(|e| RecipeError::database(e.to_string()))?;

                for fragment in registry.fragments() {
                    stmt.execute(params![
                        fragment.id.as_str(),
                        fragment.parent_id.as_str(),
                        fragment.index,
                        serde_json::to_string(&fragment.header_path)?,
                        fragment.content,
                        serde_json::to_string(&fragment.attributes)?,
                    ])
                    .map_err(|e| {
                        RecipeError::database(format!("Failed to insert fragment: {}", e))
                    })?;

                    // Header text is searchable too
                    let text = format!("{}\n{}", fragment.header_label(), fragment.content);
                    fts.execute(params![fragment.id.as_str(), index_terms(&text)])
                        .map_err(|e| RecipeError::database(e.to_string()))?;
                }
            }

            {
                let mut stmt = tx
                    .prepare("INSERT INTO embeddings (fragment_id, vector) VALUES (?1, ?2)")
                    .map_err(|e| RecipeError::database(e.to_string()))?;

                for (fragment_id, vector) in embeddings {
                    stmt.execute(params![fragment_id.as_str(), vec_to_bytes(vector)])
                        .map_err(|e| {
                            RecipeError::database(format!("Failed to insert embedding: {}", e))
                        })?;
                }
            }

            {
                let mut stmt = tx
                    .prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")
                    .map_err(|e| RecipeError::database(e.to_string()))?;
                for (key, value) in [
                    ("schema_version", SCHEMA_VERSION.to_string()),
                    ("fingerprint", meta.fingerprint.clone()),
                    ("model_id", meta.model_id.clone()),
                    ("dimension", meta.dimension.to_string()),
                ] {
                    stmt.execute(params![key, value])
                        .map_err(|e| RecipeError::database(e.to_string()))?;
                }
            }

            tx.commit()
                .map_err(|e| RecipeError::database(e.to_string()))?;

            info!(
                "Wrote snapshot: {} parents, {} fragments, {} embeddings",
                registry.parent_count(),
                registry.fragment_count(),
                embeddings.len()
            );
            Ok(())
        })
    }

    /// Read a value from the `meta` table.
    pub fn meta_value(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| RecipeError::database(e.to_string()))
        })
    }

    /// Schema version recorded in the snapshot, if any.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        Ok(self
            .meta_value("schema_version")?
            .and_then(|v| v.parse().ok()))
    }

    /// Metadata recorded in the snapshot, if it was ever completed.
    pub fn snapshot_meta(&self) -> Result<Option<SnapshotMeta>> {
        let fingerprint = match self.meta_value("fingerprint")? {
            Some(f) => f,
            None => return Ok(None),
        };
        let model_id = self.meta_value("model_id")?.unwrap_or_default();
        let dimension = self
            .meta_value("dimension")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Ok(Some(SnapshotMeta {
            fingerprint,
            model_id,
            dimension,
        }))
    }

    /// Rebuild the parent registry from the snapshot.
    pub fn load_registry(&self) -> Result<ParentRegistry> {
        let (parents, fragments) = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, source, name, content, attributes
                    FROM parents
                    ORDER BY position
                    "#,
                )
                .map_err(|e| RecipeError::database(e.to_string()))?;

            let parents = stmt
                .query_map([], |row| Self::row_to_recipe(row))
                .map_err(|e| RecipeError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RecipeError::database(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, parent_id, fragment_index, header_path, content, attributes
                    FROM fragments
                    ORDER BY parent_id, fragment_index
                    "#,
                )
                .map_err(|e| RecipeError::database(e.to_string()))?;

            let fragments = stmt
                .query_map([], |row| Self::row_to_fragment(row))
                .map_err(|e| RecipeError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RecipeError::database(e.to_string()))?;

            Ok((parents, fragments))
        })?;

        let mut grouped: std::collections::HashMap<ParentId, Vec<Fragment>> =
            std::collections::HashMap::new();
        for fragment in fragments {
            grouped
                .entry(fragment.parent_id.clone())
                .or_default()
                .push(fragment);
        }

        let mut registry = ParentRegistry::new();
        for parent in parents {
            let id = parent.id.clone();
            registry.register(parent);
            let children = grouped.remove(&id).unwrap_or_default();
            registry.link_fragments(&id, children)?;
        }

        if let Some(fragment_id) = grouped.values().flatten().map(|f| f.id.clone()).next() {
            return Err(RecipeError::OrphanFragment { fragment_id });
        }

        Ok(registry)
    }

    /// Load every stored embedding.
    pub fn load_embeddings(&self) -> Result<Vec<(FragmentId, Vec<f32>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT fragment_id, vector FROM embeddings ORDER BY fragment_id")
                .map_err(|e| RecipeError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let bytes: Vec<u8> = row.get(1)?;
                    Ok((FragmentId::new(id), bytes_to_vec(&bytes)))
                })
                .map_err(|e| RecipeError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RecipeError::database(e.to_string()))?;

            Ok(rows)
        })
    }

    /// Keyword search, best first, with the fragment's attributes.
    fn keyword_search(
        conn: &Connection,
        expression: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(FragmentId, f32, Attributes)>> {
        let mut stmt = conn
            .prepare(
                r#"
                SELECT f.fragment_id, bm25(fragments_fts) AS score, fr.attributes
                FROM fragments_fts f
                JOIN fragments fr ON fr.id = f.fragment_id
                WHERE fragments_fts MATCH ?1
                ORDER BY score, f.fragment_id
                LIMIT ?2
                "#,
            )
            .map_err(|e| RecipeError::database(e.to_string()))?;

        // -1 means no limit in SQLite
        let limit = limit.map_or(-1, |l| l as i64);
        let rows = stmt
            .query_map(params![expression, limit], |row| {
                let id: String = row.get(0)?;
                let score: f64 = row.get(1)?;
                let attributes: String = row.get(2)?;
                // bm25() is lower-is-better
                Ok((FragmentId::new(id), (-score) as f32, attributes))
            })
            .map_err(|e| RecipeError::database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RecipeError::database(e.to_string()))?;

        rows.into_iter()
            .map(|(id, score, attributes)| Ok((id, score, serde_json::from_str(&attributes)?)))
            .collect()
    }
}

#[async_trait]
impl LexicalBackend for SqliteStore {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<RankedCandidate>> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let filter = filter.filter(|p| !p.is_empty());
        // With a filter, rank every match and filter before truncating
        let limit = if filter.is_some() { None } else { Some(k) };

        // SQLite blocks; keep it off the executor so the caller's timeout holds
        let conn = Arc::clone(&self.conn);
        let hits = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| RecipeError::database(e.to_string()))?;
            Self::keyword_search(&conn, &expression, limit)
        })
        .await
        .map_err(|e| RecipeError::database(format!("Keyword search task failed: {}", e)))??;
        let matched = hits.len();
        let kept: Vec<(FragmentId, f32)> = hits
            .into_iter()
            .filter(|(_, _, attributes)| filter.map_or(true, |p| p.matches(attributes)))
            .take(k)
            .map(|(id, score, _)| (id, score))
            .collect();

        debug!("Keyword search: {} matches, {} kept", matched, kept.len());
        Ok(RankedCandidate::rank_list(kept))
    }

    fn supports_prefilter(&self) -> bool {
        true
    }
}

// Helper methods
impl SqliteStore {
    fn row_to_recipe(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipe> {
        let id: String = row.get(0)?;
        let attributes: String = row.get(4)?;

        Ok(Recipe {
            id: ParentId::new(id),
            source: row.get(1)?,
            name: row.get(2)?,
            content: row.get(3)?,
            attributes: json_column(4, &attributes)?,
            fragment_ids: Vec::new(),
        })
    }

    fn row_to_fragment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fragment> {
        let id: String = row.get(0)?;
        let parent_id: String = row.get(1)?;
        let header_path: String = row.get(3)?;
        let attributes: String = row.get(5)?;

        Ok(Fragment {
            id: FragmentId::new(id),
            parent_id: ParentId::new(parent_id),
            index: row.get(2)?,
            header_path: json_column(3, &header_path)?,
            content: row.get(4)?,
            attributes: json_column(5, &attributes)?,
        })
    }
}

/// Decode a JSON text column; a bad value fails the row.
fn json_column<T: serde::de::DeserializeOwned>(index: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
