//! Retrieval engine: retrieve, fuse, aggregate.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use recipe_core::{Embedder, Predicate, RecipeError, RetrievalConfig, Result};
use recipe_store::CorpusHandle;

use crate::aggregate::{AggregatedParent, OrphanPolicy, ResultAggregator};
use crate::fusion::{FusedCandidate, RrfFusion};
use crate::retriever::{ChannelResults, DualChannelRetriever, RetrieverConfig};

/// Everything one search produced.
#[derive(Debug)]
pub struct Retrieval {
    pub query: String,

    /// Fingerprint of the corpus snapshot that answered.
    pub fingerprint: String,

    /// Per-channel candidates and statuses.
    pub channels: ChannelResults,

    /// Fused fragments, best first.
    pub fused: Vec<FusedCandidate>,

    /// Parents of the fused fragments, deduplicated and ordered.
    pub parents: Vec<AggregatedParent>,

    /// Degraded channels and over-restrictive filters.
    pub diagnostics: Vec<RecipeError>,

    pub latency_ms: u64,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Hybrid retrieval over the current corpus snapshot.
///
/// Each search pins one snapshot for its whole duration, so a concurrent
/// rebuild never mixes registries and backends.
pub struct RetrievalEngine {
    handle: Arc<CorpusHandle>,
    retriever: DualChannelRetriever,
    fusion: RrfFusion,
    aggregator: ResultAggregator,
    fan_out: usize,
    top_k: usize,
}

impl RetrievalEngine {
    /// Create an engine from the retrieval section of the config.
    pub fn new(
        handle: Arc<CorpusHandle>,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        if config.fan_out == 0 || config.top_k == 0 {
            return Err(RecipeError::invalid_argument(
                "fan_out and top_k must be positive",
            ));
        }

        let retriever = DualChannelRetriever::new(
            embedder,
            RetrieverConfig {
                channel_timeout: config.channel_timeout(),
                widen_factor: config.widen_factor,
            },
        );

        Ok(Self {
            handle,
            retriever,
            fusion: RrfFusion::new(config.rrf_k)?,
            aggregator: ResultAggregator::default(),
            fan_out: config.fan_out,
            top_k: config.top_k,
        })
    }

    /// Replace the orphan policy.
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.aggregator = ResultAggregator::new(policy);
        self
    }

    pub fn handle(&self) -> &Arc<CorpusHandle> {
        &self.handle
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run a hybrid search for `query`, optionally restricted by `filter`.
    ///
    /// Channel failures are reported in `diagnostics`; if both channels fail
    /// the result is empty.
    pub async fn search(&self, query: &str, filter: Option<&Predicate>) -> Retrieval {
        let start = Instant::now();
        let corpus = self.handle.load();

        info!("Searching for: {:?}", query);
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            debug!("Filter: {}", filter);
        }

        let channels = self
            .retriever
            .retrieve(&corpus, query, self.fan_out, filter)
            .await;

        let fused = self
            .fusion
            .fuse(&channels.semantic.candidates, &channels.lexical.candidates, self.top_k);
        debug!("Fused to {} fragments", fused.len());

        let parents = self.aggregator.aggregate_parents(&fused, corpus.registry());
        let diagnostics = channels.diagnostics();
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} recipes",
            latency_ms,
            parents.len()
        );

        Retrieval {
            query: query.to_string(),
            fingerprint: corpus.fingerprint().to_string(),
            channels,
            fused,
            parents,
            diagnostics,
            latency_ms,
        }
    }
}
