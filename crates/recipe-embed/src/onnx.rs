//! ONNX-based embedding model implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use recipe_core::{Embedder, EmbeddingConfig, Pooling, RecipeError, Result};

/// BERT-family context window.
const MAX_TOKENS: usize = 512;

/// ONNX-based embedder for BGE-style sentence-embedding models.
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Arc<Tokenizer>,

    /// Expected embedding dimension.
    dimension: usize,

    /// Maximum token count.
    max_tokens: usize,

    pooling: Pooling,

    /// Prepended to queries only.
    query_instruction: String,

    /// Whether the model takes a `token_type_ids` input.
    token_type_ids: bool,

    model_id: String,
}

impl OnnxEmbedder {
    /// Create an embedder from the embedding section of the config.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model_path = config.model_path.as_path();
        let tokenizer_path = config.tokenizer_path.as_path();

        if !model_path.exists() {
            return Err(RecipeError::embedding(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }

        info!("Loading ONNX model from {:?}", model_path);

        // Initialize ONNX Runtime session
        let session = Session::builder()
            .map_err(|e| RecipeError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RecipeError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.num_threads.max(1))
            .map_err(|e| RecipeError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RecipeError::embedding(format!("Failed to load model: {}", e)))?;

        info!("Loading tokenizer from {:?}", tokenizer_path);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RecipeError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        let model_id = format!(
            "onnx:{}:{:?}",
            model_name(model_path),
            config.pooling
        )
        .to_lowercase();

        info!(
            "Embedder initialized: {} dim={}, max_tokens={}",
            model_id, config.dimension, MAX_TOKENS
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension: config.dimension,
            max_tokens: MAX_TOKENS,
            pooling: config.pooling,
            query_instruction: config.query_instruction.clone(),
            token_type_ids: config.token_type_ids,
            model_id,
        })
    }

    /// Embed a batch of texts with a given prefix.
    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let prefixed_refs: Vec<&str> = prefixed.iter().map(|s| s.as_str()).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed_refs, true)
            .map_err(|e| RecipeError::embedding(format!("Tokenization failed: {}", e)))?;

        // Get max length for padding
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);

        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| RecipeError::embedding(format!("Failed to create input tensor: {}", e)))?;

        let attention_mask_tensor = Tensor::from_array((vec![batch_size, max_len], attention_mask))
            .map_err(|e| RecipeError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecipeError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = if self.token_type_ids {
            let token_type_tensor =
                Tensor::from_array((vec![batch_size, max_len], vec![0i64; batch_size * max_len]))
                    .map_err(|e| {
                        RecipeError::embedding(format!("Failed to create token type tensor: {}", e))
                    })?;
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_tensor
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
        }
        .map_err(|e| RecipeError::embedding(format!("Inference failed: {}", e)))?;

        // First output is the hidden state (batch, seq, hidden) or an
        // already pooled (batch, hidden)
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RecipeError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RecipeError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape_dims: Vec<usize> = view.shape().to_vec();
        debug!("Output shape: {:?}", shape_dims);

        let embeddings = match (shape_dims.len(), self.pooling) {
            (3, Pooling::Cls) => Self::cls_pool_3d(&view),
            (3, Pooling::Mean) => Self::mean_pool_3d(&view, &encodings, max_len),
            (2, _) => {
                let hidden_dim = shape_dims[1];
                (0..batch_size)
                    .map(|i| {
                        let embedding: Vec<f32> = (0..hidden_dim).map(|j| view[[i, j]]).collect();
                        l2_normalize(embedding)
                    })
                    .collect()
            }
            _ => {
                return Err(RecipeError::embedding(format!(
                    "Unexpected output shape: {:?}",
                    shape_dims
                )))
            }
        };

        if let Some(first) = embeddings.first() {
            if first.len() != self.dimension {
                return Err(RecipeError::embedding(format!(
                    "model produced dimension {}, config says {}",
                    first.len(),
                    self.dimension
                )));
            }
        }

        Ok(embeddings)
    }

    /// First-token pooling over a [batch, seq, hidden] view.
    fn cls_pool_3d(tensor: &ArrayViewD<'_, f32>) -> Vec<Vec<f32>> {
        let shape = tensor.shape();
        let (batch_size, hidden_dim) = (shape[0], shape[2]);

        (0..batch_size)
            .map(|i| l2_normalize((0..hidden_dim).map(|k| tensor[[i, 0, k]]).collect()))
            .collect()
    }

    /// Mean pooling over sequence dimension with attention mask.
    fn mean_pool_3d(
        tensor: &ArrayViewD<'_, f32>,
        encodings: &[tokenizers::Encoding],
        max_len: usize,
    ) -> Vec<Vec<f32>> {
        let shape = tensor.shape();
        let seq_len = shape[1];
        let hidden_dim = shape[2];

        let mut embeddings = Vec::with_capacity(shape[0]);

        for (i, encoding) in encodings.iter().enumerate() {
            let attention_mask = encoding.get_attention_mask();
            let limit = max_len.min(seq_len).min(attention_mask.len());

            let mut sum = vec![0.0f32; hidden_dim];
            let mut valid = 0usize;
            for j in 0..limit {
                if attention_mask[j] == 1 {
                    valid += 1;
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            if valid == 0 {
                embeddings.push(vec![0.0; hidden_dim]);
                continue;
            }

            let embedding: Vec<f32> = sum.iter().map(|s| s / valid as f32).collect();
            embeddings.push(l2_normalize(embedding));
        }

        embeddings
    }
}

/// Model name for the fingerprint: the model's directory, or its file stem.
fn model_name(model_path: &Path) -> String {
    model_path
        .parent()
        .and_then(|p| p.file_name())
        .or_else(|| model_path.file_stem())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

/// L2 normalize a vector.
fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Runs synchronously; the session is behind a Mutex
        self.embed_batch(texts, "")
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text];
        let results = self.embed_batch(&texts, &self.query_instruction)?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RecipeError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
