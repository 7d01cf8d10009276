//! Corpus snapshots: build, persist, reopen and swap.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use recipe_chunk::LoadedDocument;
use recipe_core::{
    Embedder, FragmentId, LexicalBackend, RecipeError, Result, SemanticBackend,
};

use crate::registry::ParentRegistry;
use crate::schema::SCHEMA_VERSION;
use crate::sqlite::{SnapshotMeta, SqliteStore};
use crate::vector::FlatVectorIndex;

/// Digest identifying a corpus build.
///
/// Covers the schema version, the embedding model and every source's path
/// and content hash, so any change to inputs or model invalidates the
/// snapshot.
pub fn fingerprint(documents: &[LoadedDocument], model_id: &str, dimension: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("schema:{}\n", SCHEMA_VERSION).as_bytes());
    hasher.update(format!("model:{}:{}\n", model_id, dimension).as_bytes());

    let mut sources: Vec<(&str, String)> = documents
        .iter()
        .map(|d| (d.recipe.source.as_str(), d.recipe.content_hash()))
        .collect();
    sources.sort();

    for (source, hash) in sources {
        hasher.update(source.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }

    hasher.finalize().to_hex().to_string()
}

/// Register every document and link its fragments.
///
/// Structural violations are hard errors.
pub fn build_registry(documents: Vec<LoadedDocument>) -> Result<ParentRegistry> {
    let mut registry = ParentRegistry::new();

    for doc in documents {
        let id = doc.recipe.id.clone();
        if !registry.register(doc.recipe) {
            warn!("Duplicate recipe id {}, keeping the first", id);
            continue;
        }
        registry.link_fragments(&id, doc.fragments)?;
    }

    registry.validate()?;
    Ok(registry)
}

/// One immutable corpus build: registry plus both search backends.
pub struct Corpus {
    registry: Arc<ParentRegistry>,
    semantic: Arc<dyn SemanticBackend>,
    lexical: Arc<dyn LexicalBackend>,
    fingerprint: String,
}

impl Corpus {
    /// Assemble a corpus from parts.
    pub fn new(
        registry: Arc<ParentRegistry>,
        semantic: Arc<dyn SemanticBackend>,
        lexical: Arc<dyn LexicalBackend>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            semantic,
            lexical,
            fingerprint: fingerprint.into(),
        }
    }

    /// Build a corpus from loaded documents and persist it as a snapshot.
    ///
    /// The snapshot is written to a temporary sibling file and renamed over
    /// `snapshot_path`, so a reader never sees a half-written file.
    pub async fn build(
        documents: Vec<LoadedDocument>,
        embedder: &dyn Embedder,
        snapshot_path: &Path,
        batch_size: usize,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(RecipeError::EmptyCorpus {
                path: snapshot_path.display().to_string(),
            });
        }

        let meta = SnapshotMeta {
            fingerprint: fingerprint(&documents, embedder.model_id(), embedder.dimension()),
            model_id: embedder.model_id().to_string(),
            dimension: embedder.dimension(),
        };

        let registry = build_registry(documents)?;
        info!(
            "Building corpus: {} recipes, {} fragments",
            registry.parent_count(),
            registry.fragment_count()
        );

        let embeddings = embed_fragments(&registry, embedder, batch_size).await?;

        let tmp_path = tmp_sibling(snapshot_path);
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }
        {
            let tmp = SqliteStore::open(&tmp_path)?;
            tmp.write_corpus(&registry, &embeddings, &meta)?;
        }
        std::fs::rename(&tmp_path, snapshot_path)?;
        info!("Snapshot saved to {:?}", snapshot_path);

        let store = SqliteStore::open(snapshot_path)?;
        let semantic = FlatVectorIndex::build(&registry, embeddings, meta.dimension)?;

        Ok(Self::new(
            Arc::new(registry),
            Arc::new(semantic),
            Arc::new(store),
            meta.fingerprint,
        ))
    }

    /// Reopen a persisted snapshot.
    ///
    /// Returns `Ok(None)` when the snapshot is missing, unreadable, from
    /// another schema version, or stale against `expected_fingerprint`; the
    /// caller rebuilds in every such case.
    pub fn open_snapshot(snapshot_path: &Path, expected_fingerprint: &str) -> Result<Option<Self>> {
        if !snapshot_path.exists() {
            info!("No snapshot at {:?}", snapshot_path);
            return Ok(None);
        }

        match Self::try_open(snapshot_path, expected_fingerprint) {
            Ok(corpus) => Ok(corpus),
            Err(e) => {
                warn!("Snapshot {:?} unusable, rebuilding: {}", snapshot_path, e);
                Ok(None)
            }
        }
    }

    fn try_open(snapshot_path: &Path, expected_fingerprint: &str) -> Result<Option<Self>> {
        let store = SqliteStore::open(snapshot_path)?;

        let version = store.schema_version()?;
        if version != Some(SCHEMA_VERSION) {
            warn!(
                "Snapshot schema version {:?}, expected {}",
                version, SCHEMA_VERSION
            );
            return Ok(None);
        }

        let meta = match store.snapshot_meta()? {
            Some(meta) => meta,
            None => return Err(RecipeError::snapshot("snapshot has no fingerprint")),
        };
        if meta.fingerprint != expected_fingerprint {
            warn!("Snapshot is stale (fingerprint changed)");
            return Ok(None);
        }

        let registry = store.load_registry()?;
        if registry.is_empty() {
            return Err(RecipeError::snapshot("snapshot holds no recipes"));
        }
        let embeddings = store.load_embeddings()?;
        let semantic = FlatVectorIndex::build(&registry, embeddings, meta.dimension)?;

        info!(
            "Loaded snapshot: {} recipes, {} fragments",
            registry.parent_count(),
            registry.fragment_count()
        );

        Ok(Some(Self::new(
            Arc::new(registry),
            Arc::new(semantic),
            Arc::new(store),
            meta.fingerprint,
        )))
    }

    pub fn registry(&self) -> &Arc<ParentRegistry> {
        &self.registry
    }

    pub fn semantic(&self) -> &Arc<dyn SemanticBackend> {
        &self.semantic
    }

    pub fn lexical(&self) -> &Arc<dyn LexicalBackend> {
        &self.lexical
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

async fn embed_fragments(
    registry: &ParentRegistry,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<Vec<(FragmentId, Vec<f32>)>> {
    let fragments: Vec<_> = registry.fragments().collect();
    let mut embeddings = Vec::with_capacity(fragments.len());

    for batch in fragments.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = batch.iter().map(|f| f.content.as_str()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(RecipeError::embedding(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }
        embeddings.extend(batch.iter().map(|f| f.id.clone()).zip(vectors));
        debug!("Embedded {}/{} fragments", embeddings.len(), fragments.len());
    }

    Ok(embeddings)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index.sqlite".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// The current corpus, replaceable as a whole.
///
/// Queries take an `Arc` to the current snapshot and keep it for their whole
/// run; a rebuild swaps in a new `Arc` without disturbing them.
pub struct CorpusHandle {
    current: RwLock<Arc<Corpus>>,
}

impl CorpusHandle {
    pub fn new(corpus: Corpus) -> Self {
        Self {
            current: RwLock::new(Arc::new(corpus)),
        }
    }

    /// The snapshot queries should read.
    pub fn load(&self) -> Arc<Corpus> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Install a new snapshot, returning the previous one.
    pub fn replace(&self, corpus: Corpus) -> Arc<Corpus> {
        let next = Arc::new(corpus);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        info!("Swapping corpus {} -> {}", short(guard.fingerprint()), short(next.fingerprint()));
        std::mem::replace(&mut *guard, next)
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
