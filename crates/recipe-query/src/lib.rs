//! recipe-query - Retrieval and ranking engine
//!
//! This crate answers a query with recipes: it searches the semantic and
//! lexical channels concurrently, fuses their rankings with Reciprocal Rank
//! Fusion (RRF), and collapses the fused fragments into parent recipes.
//!
//! # Features
//!
//! - Dual-channel retrieval with per-channel timeouts and graceful degradation
//! - Deterministic RRF with a total tie-break order
//! - Parent aggregation by fragment tally
//! - Metadata filtering, pushed down or applied after over-fetching
//! - Intent routing and query rewriting
//!
//! # Example
//!
//! ```rust,ignore
//! use recipe_query::RetrievalEngine;
//! use std::sync::Arc;
//!
//! let engine = RetrievalEngine::new(handle, embedder, &config.retrieval)?;
//! let retrieval = engine.search("红烧肉怎么做", None).await;
//! for parent in &retrieval.parents {
//!     println!("{} ({} fragments)", parent.parent.name, parent.tally);
//! }
//! ```

mod aggregate;
mod engine;
mod filter;
mod fusion;
mod retriever;
mod router;

#[cfg(test)]
mod testing;

pub use aggregate::{AggregatedParent, OrphanPolicy, ResultAggregator};
pub use engine::{Retrieval, RetrievalEngine};
pub use filter::{filter, DEFAULT_WIDEN_FACTOR};
pub use fusion::{reciprocal_rank_fusion, FusedCandidate, RrfFusion, DEFAULT_RRF_K};
pub use retriever::{
    ChannelOutcome, ChannelResults, ChannelStatus, DualChannelRetriever, RetrieverConfig,
};
pub use router::{QueryRouter, RoutedQuery};

// Re-export for convenience
pub use recipe_core::{Intent, Predicate};
