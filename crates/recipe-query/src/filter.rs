//! Post-retrieval metadata filtering.
//!
//! Backends that can filter before truncating to `k` receive the predicate
//! directly. For the others the retriever over-fetches and calls
//! [`filter`] afterwards.

use recipe_core::{Predicate, RankedCandidate};
use recipe_store::ParentRegistry;

/// Default over-fetch factor for post-filtering.
pub const DEFAULT_WIDEN_FACTOR: usize = 3;

/// Keep the candidates whose fragment attributes satisfy `predicate`.
///
/// Survivors are re-ranked 1..n in their original order. Candidates the
/// registry does not know cannot match and are dropped.
pub fn filter(
    candidates: Vec<RankedCandidate>,
    predicate: &Predicate,
    registry: &ParentRegistry,
) -> Vec<RankedCandidate> {
    if predicate.is_empty() {
        return candidates;
    }

    let kept = candidates.into_iter().filter(|c| {
        registry
            .fragment(&c.fragment_id)
            .is_some_and(|f| predicate.matches(&f.attributes))
    });

    RankedCandidate::rank_list(kept.map(|c| (c.fragment_id, c.score)))
}
