//! recipe-embed - Text embedding backends
//!
//! Two [`Embedder`] implementations:
//!
//! - [`OnnxEmbedder`]: a BGE-style sentence-embedding model run through ONNX
//!   Runtime, with CLS or mean pooling and a query instruction prefix.
//! - [`HashEmbedder`]: deterministic feature hashing over words and CJK
//!   n-grams. Needs no model files, so it is the default and the test
//!   backend.

mod hashing;
mod onnx;

use std::sync::Arc;

use tracing::info;

pub use hashing::HashEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the Embedder trait for convenience
pub use recipe_core::Embedder;

use recipe_core::{EmbeddingBackend, EmbeddingConfig, Result};

/// Construct the embedder selected by `config.backend`.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.dimension)),
        EmbeddingBackend::Onnx => Arc::new(OnnxEmbedder::from_config(config)?),
    };
    info!(
        "Embedder ready: {} (dim={})",
        embedder.model_id(),
        embedder.dimension()
    );
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_hash_embedder() {
        let embedder = from_config(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.dimension(), 512);
        assert!(embedder.model_id().starts_with("hash"));
    }

    #[test]
    fn test_missing_onnx_model_is_embedding_error() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::Onnx,
            model_path: "/nonexistent/model.onnx".into(),
            ..Default::default()
        };
        let err = from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }
}
