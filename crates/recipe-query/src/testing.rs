//! Scripted backends shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use recipe_chunk::CorpusLoader;
use recipe_core::{
    Embedder, FragmentId, LexicalBackend, ParentId, Predicate, RankedCandidate, RecipeError,
    Result, SemanticBackend,
};
use recipe_store::{build_registry, Corpus};

/// Four one-fragment recipes; even indices are meat, odd are vegetable.
pub const DOCUMENTS: [(&str, &str); 4] = [
    ("meat_dish/红烧肉.md", "# 红烧肉\n\n★★★★\n\n五花肉 冰糖 酱油"),
    ("vegetable_dish/拍黄瓜.md", "# 拍黄瓜\n\n★\n\n黄瓜 蒜 醋"),
    ("meat_dish/可乐鸡翅.md", "# 可乐鸡翅\n\n★★\n\n鸡翅 可乐"),
    ("vegetable_dish/清炒菠菜.md", "# 清炒菠菜\n\n★★\n\n菠菜 蒜"),
];

pub fn fragment_id(index: usize) -> FragmentId {
    FragmentId::for_parent(&ParentId::from_relative_path(DOCUMENTS[index].0), 0)
}

/// Corpus over [`DOCUMENTS`] with the given backends, plus its fragment ids.
pub fn corpus_with(semantic: Scripted, lexical: Scripted) -> (Corpus, Vec<FragmentId>) {
    let loader = CorpusLoader::new("/unused");
    let documents = DOCUMENTS
        .iter()
        .map(|(path, text)| loader.build_document(path, text))
        .collect();
    let registry = build_registry(documents).unwrap();
    let ids = (0..DOCUMENTS.len()).map(fragment_id).collect();

    let corpus = Corpus::new(
        Arc::new(registry),
        Arc::new(semantic),
        Arc::new(lexical),
        "test-fingerprint",
    );
    (corpus, ids)
}

/// Backend that answers with a fixed list of [`DOCUMENTS`] indices.
pub struct Scripted {
    hits: Vec<usize>,
    fail: bool,
    delay: Option<Duration>,
    prefilter: bool,
    seen: Arc<Mutex<Vec<(usize, bool)>>>,
}

impl Scripted {
    pub fn returning(hits: &[usize]) -> Self {
        Self {
            hits: hits.to_vec(),
            fail: false,
            delay: None,
            prefilter: false,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning(&[])
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_prefilter(mut self) -> Self {
        self.prefilter = true;
        self
    }

    /// `(k, filter given)` for each call.
    pub fn seen(&self) -> Arc<Mutex<Vec<(usize, bool)>>> {
        Arc::clone(&self.seen)
    }

    async fn answer(&self, k: usize, filter: Option<&Predicate>) -> Result<Vec<RankedCandidate>> {
        self.seen.lock().unwrap().push((k, filter.is_some()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RecipeError::database("backend offline"));
        }
        Ok(RankedCandidate::rank_list(
            self.hits
                .iter()
                .take(k)
                .map(|i| (fragment_id(*i), 1.0 / (*i as f32 + 1.0))),
        ))
    }
}

#[async_trait]
impl SemanticBackend for Scripted {
    async fn search(
        &self,
        _embedding: &[f32],
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<RankedCandidate>> {
        self.answer(k, filter).await
    }

    fn supports_prefilter(&self) -> bool {
        self.prefilter
    }
}

#[async_trait]
impl LexicalBackend for Scripted {
    async fn search(
        &self,
        _query: &str,
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<RankedCandidate>> {
        self.answer(k, filter).await
    }

    fn supports_prefilter(&self) -> bool {
        self.prefilter
    }
}

/// Embedder that maps every text to the same vector.
pub struct ConstEmbedder;

#[async_trait]
impl Embedder for ConstEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "const"
    }
}
