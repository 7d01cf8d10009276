//! Collaborator interfaces between components.

use async_trait::async_trait;

use crate::error::Result;
use crate::predicate::Predicate;
use crate::types::{FragmentDraft, RankedCandidate};

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of fragment texts for indexing.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Identifier of the model, part of the snapshot fingerprint.
    fn model_id(&self) -> &str;
}

/// Vector-similarity search over the fragment corpus.
#[async_trait]
pub trait SemanticBackend: Send + Sync {
    /// Return up to `k` fragments ranked by similarity to `embedding`.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<RankedCandidate>>;

    /// Whether `filter` is applied before truncation to `k`.
    fn supports_prefilter(&self) -> bool {
        false
    }
}

/// Keyword search over the fragment corpus.
#[async_trait]
pub trait LexicalBackend: Send + Sync {
    /// Return up to `k` fragments ranked by keyword relevance to `query`.
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<RankedCandidate>>;

    /// Whether `filter` is applied before truncation to `k`.
    fn supports_prefilter(&self) -> bool {
        false
    }
}

/// Language-model collaborator used for routing, rewriting and answering.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Classify a query; the raw label is interpreted by the router.
    async fn classify(&self, query: &str) -> Result<String>;

    /// Rewrite a vague query into a better search query.
    async fn rewrite(&self, query: &str) -> Result<String>;

    /// Complete a fully rendered prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete a prompt, handing text to `on_text` as it arrives, and
    /// return the whole reply.
    ///
    /// The default delivers the reply in one piece.
    async fn complete_streaming(
        &self,
        prompt: &str,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        let reply = self.complete(prompt).await?;
        on_text(&reply);
        Ok(reply)
    }
}

/// Structural splitter for recipe documents.
pub trait Chunker: Send + Sync {
    /// Split a document into ordered fragment drafts.
    ///
    /// Never returns an empty list.
    fn chunk(&self, content: &str) -> Vec<FragmentDraft>;
}
