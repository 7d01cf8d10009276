//! The recipe assistant: corpus lifecycle plus question answering.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use recipe_chunk::CorpusLoader;
use recipe_core::{
    attr, CookRagConfig, CorpusStats, Embedder, Generator, Intent, Predicate, Recipe, RecipeError,
    Result,
};
use recipe_llm::AnswerComposer;
use recipe_query::{QueryRouter, Retrieval, RetrievalEngine};
use recipe_store::{fingerprint, Corpus, CorpusHandle};

/// How the current corpus came to be.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    pub fingerprint: String,
    pub parents: usize,
    pub fragments: usize,

    /// True if the snapshot was rebuilt rather than reopened.
    pub rebuilt: bool,
}

/// A recipe in an answer.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeSummary {
    pub name: String,
    pub source: String,
    pub category: Option<String>,
    pub difficulty: Option<String>,

    /// Fused fragments that selected the recipe.
    pub tally: usize,
}

/// Per-recipe metadata written by [`RecipeAssistant::export_metadata`].
#[derive(Debug, Clone, Serialize)]
pub struct RecipeMetadata {
    pub source: String,
    pub dish_name: String,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub content_length: usize,
}

/// The answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub query: String,
    pub intent: Intent,

    /// Query actually searched (after rewriting).
    pub search_query: String,

    /// Filter derived from the query, if any.
    pub filter: Option<String>,

    pub answer: String,
    pub recipes: Vec<RecipeSummary>,

    /// Degraded channels and similar conditions, as messages.
    pub diagnostics: Vec<String>,
}

/// Answers cooking questions from a recipe corpus.
///
/// Owns the [`CorpusHandle`]; [`rebuild`](Self::rebuild) swaps in a fresh
/// snapshot while in-flight questions finish on the old one.
pub struct RecipeAssistant {
    config: CookRagConfig,
    embedder: Arc<dyn Embedder>,
    handle: Arc<CorpusHandle>,
    engine: RetrievalEngine,
    router: Option<QueryRouter>,
    composer: Option<AnswerComposer>,
    rebuild_lock: Mutex<()>,
    report: std::sync::Mutex<CorpusReport>,
}

impl RecipeAssistant {
    /// Load the corpus snapshot, building it if missing or stale.
    ///
    /// Without a generator the assistant can search but not answer.
    pub async fn open(
        config: CookRagConfig,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Result<Self> {
        config.validate()?;

        let (corpus, report) = load_or_build(&config, embedder.as_ref(), false).await?;
        let handle = Arc::new(CorpusHandle::new(corpus));
        let engine = RetrievalEngine::new(Arc::clone(&handle), Arc::clone(&embedder), &config.retrieval)?;

        let router = generator.as_ref().map(|g| QueryRouter::new(Arc::clone(g)));
        let composer = generator
            .map(|g| AnswerComposer::new(g, config.generation.context_max_chars));

        Ok(Self {
            config,
            embedder,
            handle,
            engine,
            router,
            composer,
            rebuild_lock: Mutex::new(()),
            report: std::sync::Mutex::new(report),
        })
    }

    pub fn config(&self) -> &CookRagConfig {
        &self.config
    }

    pub fn handle(&self) -> &Arc<CorpusHandle> {
        &self.handle
    }

    /// How the current snapshot was obtained.
    pub fn report(&self) -> CorpusReport {
        self.report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reload the corpus and swap it in.
    ///
    /// With `force` the snapshot is rebuilt even if its fingerprint still
    /// matches. Concurrent rebuilds run one at a time.
    pub async fn rebuild(&self, force: bool) -> Result<CorpusReport> {
        let _guard = self.rebuild_lock.lock().await;

        let (corpus, report) = load_or_build(&self.config, self.embedder.as_ref(), force).await?;
        self.handle.replace(corpus);

        *self.report.lock().unwrap_or_else(|e| e.into_inner()) = report.clone();
        Ok(report)
    }

    /// Filter derived from the query's keywords, when enabled.
    fn derived_filter(&self, query: &str) -> Option<Predicate> {
        self.config
            .retrieval
            .derive_filters
            .then(|| Predicate::from_query(query))
            .filter(|p| !p.is_empty())
    }

    /// Retrieval only: no routing, rewriting or generation.
    ///
    /// An explicit filter is always honoured, even when it leaves nothing.
    /// Without one, a filter derived from the query is tried first and
    /// dropped if it matches no recipe.
    pub async fn search(&self, query: &str, filter: Option<Predicate>) -> Retrieval {
        match filter.filter(|p| !p.is_empty()) {
            Some(explicit) => self.engine.search(query, Some(&explicit)).await,
            None => {
                let derived = self.derived_filter(query);
                self.search_derived(query, derived.as_ref()).await
            }
        }
    }

    async fn search_derived(&self, query: &str, derived: Option<&Predicate>) -> Retrieval {
        let retrieval = self.engine.search(query, derived).await;
        match derived {
            Some(filter) if retrieval.is_empty() => {
                warn!("No recipes match [{}], searching without it", filter);
                let mut unfiltered = self.engine.search(query, None).await;
                unfiltered.diagnostics.extend(retrieval.diagnostics);
                unfiltered
            }
            _ => retrieval,
        }
    }

    /// Route, retrieve and answer a question.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        self.respond(query, None).await
    }

    /// Like [`ask`](Self::ask), handing answer text to `on_text` as it is
    /// generated.
    pub async fn ask_streaming(
        &self,
        query: &str,
        on_text: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Answer> {
        self.respond(query, Some(on_text)).await
    }

    async fn respond(
        &self,
        query: &str,
        on_text: Option<&mut (dyn FnMut(&str) + Send)>,
    ) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RecipeError::invalid_argument("question is empty"));
        }

        let (router, composer) = match (&self.router, &self.composer) {
            (Some(router), Some(composer)) => (router, composer),
            _ => {
                return Err(RecipeError::config(
                    "no generator configured; set the API key to ask questions",
                ))
            }
        };

        let routed = router.route(query).await;
        // Filters come from what the user typed, not the rewrite
        let filter = self.derived_filter(query);
        let retrieval = self.search_derived(&routed.search_query, filter.as_ref()).await;

        let recipes: Vec<Arc<Recipe>> = retrieval
            .parents
            .iter()
            .map(|p| Arc::clone(&p.parent))
            .collect();

        info!(
            "Answering {:?} as {} from {} recipes",
            query,
            routed.intent,
            recipes.len()
        );

        let answer = match on_text {
            Some(on_text) => {
                composer
                    .answer_streaming(query, routed.intent, &recipes, on_text)
                    .await?
            }
            None => composer.answer(query, routed.intent, &recipes).await?,
        };

        Ok(Answer {
            query: query.to_string(),
            intent: routed.intent,
            search_query: routed.search_query,
            filter: filter.map(|f| f.to_string()),
            answer,
            recipes: retrieval
                .parents
                .iter()
                .map(|p| RecipeSummary {
                    name: p.parent.name.clone(),
                    source: p.parent.source.clone(),
                    category: p.parent.attribute_str(attr::CATEGORY).map(str::to_string),
                    difficulty: p.parent.attribute_str(attr::DIFFICULTY).map(str::to_string),
                    tally: p.tally,
                })
                .collect(),
            diagnostics: retrieval.diagnostics.iter().map(|d| d.to_string()).collect(),
        })
    }

    pub fn stats(&self) -> CorpusStats {
        self.handle.load().registry().stats()
    }

    /// Write per-recipe metadata as a JSON array. Returns the recipe count.
    pub fn export_metadata(&self, path: &Path) -> Result<usize> {
        let corpus = self.handle.load();
        let metadata: Vec<RecipeMetadata> = corpus
            .registry()
            .parents()
            .map(|recipe| RecipeMetadata {
                source: recipe.source.clone(),
                dish_name: recipe.name.clone(),
                category: recipe.attribute_str(attr::CATEGORY).map(str::to_string),
                difficulty: recipe.attribute_str(attr::DIFFICULTY).map(str::to_string),
                content_length: recipe.content.chars().count(),
            })
            .collect();

        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(path, json)?;

        info!("Exported metadata for {} recipes to {:?}", metadata.len(), path);
        Ok(metadata.len())
    }
}

/// Reopen the snapshot if it matches the corpus on disk, else rebuild it.
async fn load_or_build(
    config: &CookRagConfig,
    embedder: &dyn Embedder,
    force: bool,
) -> Result<(Corpus, CorpusReport)> {
    let documents = CorpusLoader::new(&config.corpus.data_path).load()?;
    let expected = fingerprint(&documents, embedder.model_id(), embedder.dimension());
    let snapshot_path = config.corpus.snapshot_path.as_path();

    if !force {
        if let Some(corpus) = Corpus::open_snapshot(snapshot_path, &expected)? {
            let report = report_for(&corpus, false);
            return Ok((corpus, report));
        }
    }

    if let Some(parent) = snapshot_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let corpus = Corpus::build(documents, embedder, snapshot_path, config.embedding.batch_size).await?;
    let report = report_for(&corpus, true);
    Ok((corpus, report))
}

fn report_for(corpus: &Corpus, rebuilt: bool) -> CorpusReport {
    CorpusReport {
        fingerprint: corpus.fingerprint().to_string(),
        parents: corpus.registry().parent_count(),
        fragments: corpus.registry().fragment_count(),
        rebuilt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recipe_embed::HashEmbedder;
    use tempfile::TempDir;

    /// Generator with a fixed label that echoes the prompt.
    struct Scripted {
        label: &'static str,
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn classify(&self, _query: &str) -> Result<String> {
            Ok(self.label.to_string())
        }

        async fn rewrite(&self, query: &str) -> Result<String> {
            Ok(query.to_string())
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(format!("ANSWER\n{}", prompt))
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn corpus_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "meat_dish/红烧肉.md",
            "# 红烧肉的做法\n\n预估烹饪难度：★★★★\n\n## 必备原料和工具\n\n- 五花肉\n- 冰糖\n\n## 操作\n\n- 五花肉切块焯水\n- 小火炖一小时\n",
        );
        write(
            dir.path(),
            "vegetable_dish/拍黄瓜.md",
            "# 拍黄瓜的做法\n\n预估烹饪难度：★\n\n## 必备原料和工具\n\n- 黄瓜\n- 蒜\n\n## 操作\n\n- 拍碎黄瓜\n- 加蒜和醋拌匀\n",
        );
        write(
            dir.path(),
            "vegetable_dish/清炒菠菜.md",
            "# 清炒菠菜的做法\n\n预估烹饪难度：★★\n\n## 必备原料和工具\n\n- 菠菜\n- 蒜\n\n## 操作\n\n- 菠菜洗净\n- 大火快炒\n",
        );
        dir
    }

    fn config(data: &Path, snapshot: &Path) -> CookRagConfig {
        let mut config = CookRagConfig::default();
        config.corpus.data_path = data.to_path_buf();
        config.corpus.snapshot_path = snapshot.to_path_buf();
        config.embedding.dimension = 256;
        config
    }

    async fn open(config: CookRagConfig, label: &'static str) -> RecipeAssistant {
        RecipeAssistant::open(
            config,
            Arc::new(HashEmbedder::new(256)),
            Some(Arc::new(Scripted { label })),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_builds_then_reuses_snapshot() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let snapshot = state.path().join("nested").join("index.sqlite");

        let first = open(config(data.path(), &snapshot), "list").await;
        assert!(first.report().rebuilt);
        assert_eq!(first.report().parents, 3);
        assert!(snapshot.exists());

        let second = open(config(data.path(), &snapshot), "list").await;
        assert!(!second.report().rebuilt);
        assert_eq!(second.report().fingerprint, first.report().fingerprint);
    }

    #[tokio::test]
    async fn test_changed_corpus_triggers_rebuild() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let snapshot = state.path().join("index.sqlite");

        let assistant = open(config(data.path(), &snapshot), "list").await;
        let before = assistant.report().fingerprint;

        write(data.path(), "soup/番茄蛋汤.md", "# 番茄蛋汤的做法\n\n★★\n\n番茄 鸡蛋");
        let report = assistant.rebuild(false).await.unwrap();
        assert!(report.rebuilt);
        assert_ne!(report.fingerprint, before);
        assert_eq!(assistant.stats().parents, 4);

        let forced = assistant.rebuild(true).await.unwrap();
        assert!(forced.rebuilt);
        assert_eq!(forced.fingerprint, report.fingerprint);
    }

    #[tokio::test]
    async fn test_ask_list_answers_with_names() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = open(config(data.path(), &state.path().join("i.sqlite")), "list").await;

        let answer = assistant.ask("推荐几道素菜").await.unwrap();
        assert_eq!(answer.intent, Intent::List);
        assert_eq!(answer.filter.as_deref(), Some("category = \"vegetable\""));
        assert!(!answer.recipes.is_empty());
        for recipe in &answer.recipes {
            assert_eq!(recipe.category.as_deref(), Some("vegetable"));
        }
        assert!(answer.answer.starts_with("为您推荐"));
    }

    #[tokio::test]
    async fn test_ask_detail_uses_context() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = open(config(data.path(), &state.path().join("i.sqlite")), "detail").await;

        let answer = assistant.ask("红烧肉怎么做").await.unwrap();
        assert_eq!(answer.intent, Intent::Detail);
        assert_eq!(answer.recipes[0].name, "红烧肉");
        assert!(answer.answer.starts_with("ANSWER"));
        assert!(answer.answer.contains("【食谱 1】 红烧肉"));
    }

    #[tokio::test]
    async fn test_ask_streaming_matches_answer() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = open(config(data.path(), &state.path().join("i.sqlite")), "general").await;

        let mut streamed = String::new();
        let answer = assistant
            .ask_streaming("黄瓜怎么拌", &mut |t: &str| streamed.push_str(t))
            .await
            .unwrap();
        assert_eq!(answer.intent, Intent::General);
        assert_eq!(streamed, answer.answer);
        assert!(streamed.starts_with("ANSWER"));
    }

    #[tokio::test]
    async fn test_search_without_generator() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = RecipeAssistant::open(
            config(data.path(), &state.path().join("i.sqlite")),
            Arc::new(HashEmbedder::new(256)),
            None,
        )
        .await
        .unwrap();

        let retrieval = assistant.search("黄瓜", None).await;
        assert_eq!(retrieval.parents[0].parent.name, "拍黄瓜");
        assert!(assistant.ask("黄瓜").await.is_err());
    }

    #[tokio::test]
    async fn test_explicit_filter_is_never_dropped() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = open(config(data.path(), &state.path().join("i.sqlite")), "list").await;

        let dessert = Predicate::new().equals(attr::CATEGORY, "dessert");
        let retrieval = assistant.search("红烧肉", Some(dessert)).await;
        assert!(retrieval.parents.is_empty());
        assert!(retrieval.is_empty());
    }

    #[tokio::test]
    async fn test_derived_filter_falls_back_when_nothing_matches() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = open(config(data.path(), &state.path().join("i.sqlite")), "list").await;

        // No dessert in the corpus, so the derived filter is dropped
        let retrieval = assistant.search("甜品 红烧肉", None).await;
        assert!(retrieval.parents.iter().any(|p| p.parent.name == "红烧肉"));
    }

    #[tokio::test]
    async fn test_export_metadata() {
        let data = corpus_dir();
        let state = TempDir::new().unwrap();
        let assistant = open(config(data.path(), &state.path().join("i.sqlite")), "list").await;

        let out = state.path().join("metadata.json");
        assert_eq!(assistant.export_metadata(&out).unwrap(), 3);

        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let first = &exported.as_array().unwrap()[0];
        assert!(first["source"].is_string());
        assert!(first["content_length"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_missing_corpus_fails() {
        let state = TempDir::new().unwrap();
        let result = RecipeAssistant::open(
            config(&state.path().join("nope"), &state.path().join("i.sqlite")),
            Arc::new(HashEmbedder::new(256)),
            None,
        )
        .await;
        assert_eq!(result.err().unwrap().error_code(), "EMPTY_CORPUS");
    }
}
