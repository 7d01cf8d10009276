//! Dual-channel retrieval: semantic and lexical search in parallel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use recipe_core::{Channel, Embedder, Predicate, RankedCandidate, RecipeError, Result};
use recipe_store::{Corpus, ParentRegistry};

use crate::filter::{filter, DEFAULT_WIDEN_FACTOR};

/// How a channel's call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelStatus {
    Ok,
    /// The backend (or the query embedding) failed.
    Unavailable { reason: String },
    /// The backend did not answer within the timeout.
    TimedOut,
    /// Post-filtering removed every candidate.
    FilterOverRestrictive { dropped: usize },
}

/// One channel's ranked list and status. The list is empty unless the
/// status is `Ok`.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub candidates: Vec<RankedCandidate>,
    pub status: ChannelStatus,
}

impl ChannelOutcome {
    fn ok(channel: Channel, candidates: Vec<RankedCandidate>) -> Self {
        Self {
            channel,
            candidates,
            status: ChannelStatus::Ok,
        }
    }

    fn failed(channel: Channel, status: ChannelStatus) -> Self {
        Self {
            channel,
            candidates: Vec::new(),
            status,
        }
    }

    /// Whether the backend answered (possibly with nothing).
    pub fn is_available(&self) -> bool {
        matches!(
            self.status,
            ChannelStatus::Ok | ChannelStatus::FilterOverRestrictive { .. }
        )
    }

    /// The status as an error value, for reporting.
    pub fn diagnostic(&self) -> Option<RecipeError> {
        match &self.status {
            ChannelStatus::Ok => None,
            ChannelStatus::Unavailable { reason } => Some(RecipeError::ChannelUnavailable {
                channel: self.channel,
                reason: reason.clone(),
            }),
            ChannelStatus::TimedOut => Some(RecipeError::ChannelUnavailable {
                channel: self.channel,
                reason: "timed out".to_string(),
            }),
            ChannelStatus::FilterOverRestrictive { dropped } => {
                Some(RecipeError::FilterOverRestrictive { dropped: *dropped })
            }
        }
    }
}

/// Both channels' results for one query.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelResults {
    pub semantic: ChannelOutcome,
    pub lexical: ChannelOutcome,
}

impl ChannelResults {
    /// Neither backend answered.
    pub fn all_unavailable(&self) -> bool {
        !self.semantic.is_available() && !self.lexical.is_available()
    }

    pub fn diagnostics(&self) -> Vec<RecipeError> {
        [&self.semantic, &self.lexical]
            .into_iter()
            .filter_map(ChannelOutcome::diagnostic)
            .collect()
    }
}

/// Retriever settings.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Per-channel deadline.
    pub channel_timeout: Duration,

    /// Over-fetch factor for backends that cannot pre-filter.
    pub widen_factor: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            channel_timeout: Duration::from_millis(5000),
            widen_factor: DEFAULT_WIDEN_FACTOR,
        }
    }
}

/// Runs the semantic and lexical channels for a query.
///
/// A channel that fails or times out yields an empty list and a status;
/// retrieval itself never fails.
pub struct DualChannelRetriever {
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl DualChannelRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, config: RetrieverConfig) -> Self {
        Self { embedder, config }
    }

    /// Query both channels of `corpus` for up to `k` candidates each.
    pub async fn retrieve(
        &self,
        corpus: &Corpus,
        query: &str,
        k: usize,
        filter: Option<&Predicate>,
    ) -> ChannelResults {
        let filter = filter.filter(|p| !p.is_empty());
        let registry = corpus.registry();

        let semantic = corpus.semantic();
        let semantic_prefilter = semantic.supports_prefilter();
        let semantic_call = async {
            let embedding = self.embedder.embed_query(query).await?;
            let (fetch, pushed) = self.plan(k, filter, semantic_prefilter);
            semantic.search(&embedding, fetch, pushed).await
        };

        let lexical = corpus.lexical();
        let lexical_prefilter = lexical.supports_prefilter();
        let lexical_call = async {
            let (fetch, pushed) = self.plan(k, filter, lexical_prefilter);
            lexical.search(query, fetch, pushed).await
        };

        let (semantic, lexical) = tokio::join!(
            self.run(Channel::Semantic, semantic_call),
            self.run(Channel::Lexical, lexical_call)
        );

        let semantic = self.finish(Channel::Semantic, semantic, k, filter, semantic_prefilter, registry);
        let lexical = self.finish(Channel::Lexical, lexical, k, filter, lexical_prefilter, registry);

        debug!(
            "Retrieved {} semantic ({:?}), {} lexical ({:?})",
            semantic.candidates.len(),
            semantic.status,
            lexical.candidates.len(),
            lexical.status
        );

        ChannelResults { semantic, lexical }
    }

    /// How many to fetch and which filter to hand the backend.
    fn plan<'a>(
        &self,
        k: usize,
        filter: Option<&'a Predicate>,
        prefilter: bool,
    ) -> (usize, Option<&'a Predicate>) {
        match filter {
            Some(p) if prefilter => (k, Some(p)),
            Some(_) => (k.saturating_mul(self.config.widen_factor.max(1)), None),
            None => (k, None),
        }
    }

    async fn run<F>(&self, channel: Channel, call: F) -> std::result::Result<Vec<RankedCandidate>, ChannelStatus>
    where
        F: Future<Output = Result<Vec<RankedCandidate>>>,
    {
        match timeout(self.config.channel_timeout, call).await {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(e)) => {
                warn!("{} channel failed: {}", channel, e);
                Err(ChannelStatus::Unavailable {
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    "{} channel timed out after {:?}",
                    channel, self.config.channel_timeout
                );
                Err(ChannelStatus::TimedOut)
            }
        }
    }

    /// Post-filter (when the backend could not) and cap at `k`.
    fn finish(
        &self,
        channel: Channel,
        result: std::result::Result<Vec<RankedCandidate>, ChannelStatus>,
        k: usize,
        predicate: Option<&Predicate>,
        prefiltered: bool,
        registry: &ParentRegistry,
    ) -> ChannelOutcome {
        let mut candidates = match result {
            Ok(candidates) => candidates,
            Err(status) => return ChannelOutcome::failed(channel, status),
        };

        if let (Some(predicate), false) = (predicate, prefiltered) {
            let fetched = candidates.len();
            candidates = filter(candidates, predicate, registry);
            if fetched > 0 && candidates.is_empty() {
                warn!(
                    "{} channel: filter [{}] dropped all {} candidates",
                    channel, predicate, fetched
                );
                return ChannelOutcome::failed(
                    channel,
                    ChannelStatus::FilterOverRestrictive { dropped: fetched },
                );
            }
        }

        candidates.truncate(k);
        ChannelOutcome::ok(channel, candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corpus_with, Scripted};
    use recipe_core::attr;

    fn retriever(timeout_ms: u64) -> DualChannelRetriever {
        DualChannelRetriever::new(
            Arc::new(crate::testing::ConstEmbedder),
            RetrieverConfig {
                channel_timeout: Duration::from_millis(timeout_ms),
                widen_factor: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_both_channels_answer() {
        let (corpus, ids) = corpus_with(Scripted::returning(&[0, 1]), Scripted::returning(&[2, 0]));
        let results = retriever(1000).retrieve(&corpus, "q", 5, None).await;

        assert_eq!(results.semantic.status, ChannelStatus::Ok);
        assert_eq!(results.lexical.status, ChannelStatus::Ok);
        assert_eq!(results.semantic.candidates[0].fragment_id, ids[0]);
        assert_eq!(results.lexical.candidates[0].fragment_id, ids[2]);
        assert!(results.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_failed_channel_degrades_to_empty() {
        let (corpus, _) = corpus_with(Scripted::failing(), Scripted::returning(&[1]));
        let results = retriever(1000).retrieve(&corpus, "q", 5, None).await;

        assert!(matches!(results.semantic.status, ChannelStatus::Unavailable { .. }));
        assert!(results.semantic.candidates.is_empty());
        assert_eq!(results.lexical.candidates.len(), 1);
        assert!(!results.all_unavailable());

        let diagnostics = results.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].error_code(), "CHANNEL_UNAVAILABLE");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_channel_times_out() {
        let (corpus, _) = corpus_with(
            Scripted::returning(&[0]).delayed(Duration::from_secs(30)),
            Scripted::returning(&[1]),
        );
        let results = retriever(50).retrieve(&corpus, "q", 5, None).await;

        assert_eq!(results.semantic.status, ChannelStatus::TimedOut);
        assert!(results.semantic.candidates.is_empty());
        assert_eq!(results.lexical.status, ChannelStatus::Ok);
    }

    #[tokio::test]
    async fn test_both_channels_failing() {
        let (corpus, _) = corpus_with(Scripted::failing(), Scripted::failing());
        let results = retriever(1000).retrieve(&corpus, "q", 5, None).await;
        assert!(results.all_unavailable());
        assert_eq!(results.diagnostics().len(), 2);
    }

    #[tokio::test]
    async fn test_prefilter_is_pushed_down() {
        let semantic = Scripted::returning(&[0, 1, 2]).with_prefilter();
        let seen = semantic.seen();
        let (corpus, _) = corpus_with(semantic, Scripted::returning(&[]));

        let filter = Predicate::new().equals(attr::CATEGORY, "vegetable");
        retriever(1000).retrieve(&corpus, "q", 2, Some(&filter)).await;

        let calls = seen.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(2, true)]);
    }

    #[tokio::test]
    async fn test_widen_then_filter_without_prefilter() {
        // Fragments 0 and 2 are meat, 1 and 3 vegetable
        let lexical = Scripted::returning(&[0, 2, 1, 3]);
        let seen = lexical.seen();
        let (corpus, ids) = corpus_with(Scripted::returning(&[]), lexical);

        let filter = Predicate::new().equals(attr::CATEGORY, "vegetable");
        let results = retriever(1000).retrieve(&corpus, "q", 1, Some(&filter)).await;

        assert_eq!(seen.lock().unwrap().as_slice(), &[(3, false)]);
        assert_eq!(results.lexical.candidates.len(), 1);
        assert_eq!(results.lexical.candidates[0].fragment_id, ids[1]);
        assert_eq!(results.lexical.candidates[0].rank, 1);
    }

    #[tokio::test]
    async fn test_filter_over_restrictive_is_empty_success() {
        let (corpus, _) = corpus_with(Scripted::returning(&[]), Scripted::returning(&[0, 2]));
        let filter = Predicate::new().equals(attr::CATEGORY, "vegetable");
        let results = retriever(1000).retrieve(&corpus, "q", 5, Some(&filter)).await;

        assert_eq!(
            results.lexical.status,
            ChannelStatus::FilterOverRestrictive { dropped: 2 }
        );
        assert!(results.lexical.is_available());
        assert_eq!(
            results.lexical.diagnostic().unwrap().error_code(),
            "FILTER_OVER_RESTRICTIVE"
        );
    }
}
