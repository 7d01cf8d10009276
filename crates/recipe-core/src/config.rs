//! Configuration types for cookrag.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookRagConfig {
    /// Corpus location and snapshot path.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval and fusion configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Language model configuration.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Corpus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory holding the markdown recipes.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// SQLite snapshot of the built index.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

/// Which embedder to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing; needs no model files.
    Hash,
    /// ONNX Runtime sentence-embedding model.
    Onnx,
}

/// Token pooling strategy for transformer outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// First token (BGE family).
    Cls,
    /// Attention-masked mean.
    Mean,
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,

    /// Path to the ONNX model file.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Path to tokenizer.json.
    #[serde(default = "default_tokenizer_path")]
    pub tokenizer_path: PathBuf,

    /// Output dimension (hash backend, or expected ONNX output).
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Batch size for embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    #[serde(default = "default_pooling")]
    pub pooling: Pooling,

    /// Instruction prepended to queries (not documents).
    #[serde(default = "default_query_instruction")]
    pub query_instruction: String,

    /// Feed a zeroed `token_type_ids` input (BERT-style exports).
    #[serde(default = "default_true")]
    pub token_type_ids: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model_path: default_model_path(),
            tokenizer_path: default_tokenizer_path(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            num_threads: default_num_threads(),
            pooling: default_pooling(),
            query_instruction: default_query_instruction(),
            token_type_ids: true,
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from each channel.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// RRF smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Fused fragments kept for aggregation.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Per-channel timeout in milliseconds.
    #[serde(default = "default_channel_timeout_ms")]
    pub channel_timeout_ms: u64,

    /// Over-fetch factor for backends that cannot pre-filter.
    #[serde(default = "default_widen_factor")]
    pub widen_factor: usize,

    /// Derive category/difficulty filters from the query text.
    #[serde(default = "default_true")]
    pub derive_filters: bool,
}

impl RetrievalConfig {
    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            rrf_k: default_rrf_k(),
            top_k: default_top_k(),
            channel_timeout_ms: default_channel_timeout_ms(),
            widen_factor: default_widen_factor(),
            derive_filters: true,
        }
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Character budget for the recipe context in prompts.
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            context_max_chars: default_context_max_chars(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data").join("cook")
}

fn default_snapshot_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cookrag")
        .join("index.sqlite")
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Hash
}

fn default_model_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cookrag")
        .join("models")
        .join("bge-small-zh-v1.5")
}

fn default_model_path() -> PathBuf {
    default_model_dir().join("model.onnx")
}

fn default_tokenizer_path() -> PathBuf {
    default_model_dir().join("tokenizer.json")
}

fn default_dimension() -> usize {
    512
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_pooling() -> Pooling {
    Pooling::Cls
}

fn default_query_instruction() -> String {
    "为这个句子生成表示以用于检索相关文章：".to_string()
}

fn default_fan_out() -> usize {
    5
}

fn default_rrf_k() -> u32 {
    60
}

fn default_top_k() -> usize {
    3
}

fn default_channel_timeout_ms() -> u64 {
    5000
}

fn default_widen_factor() -> usize {
    3
}

fn default_base_url() -> String {
    "https://api.moonshot.cn/v1".to_string()
}

fn default_llm_model() -> String {
    "kimi-k2-0711-preview".to_string()
}

fn default_api_key_env() -> String {
    "MOONSHOT_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_context_max_chars() -> usize {
    2000
}

impl CookRagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            crate::error::RecipeError::config(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("cookrag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("cookrag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings the retrieval core cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let r = &self.retrieval;
        if r.rrf_k == 0 {
            return Err(crate::error::RecipeError::config("retrieval.rrf_k must be > 0"));
        }
        if r.fan_out == 0 || r.top_k == 0 {
            return Err(crate::error::RecipeError::config(
                "retrieval.fan_out and retrieval.top_k must be > 0",
            ));
        }
        if r.widen_factor == 0 {
            return Err(crate::error::RecipeError::config(
                "retrieval.widen_factor must be > 0",
            ));
        }
        Ok(())
    }
}
