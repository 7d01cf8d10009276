//! Reciprocal Rank Fusion (RRF) for combining the two channel rankings.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use recipe_core::{Channel, FragmentId, RankedCandidate, RecipeError, Result};

/// RRF constant (commonly 60).
///
/// Large enough that appearing in both lists beats being first in one.
pub const DEFAULT_RRF_K: u32 = 60;

/// One fragment in the fused ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedCandidate {
    pub fragment_id: FragmentId,

    /// Sum of `1 / (k + rank)` over the channels containing the fragment.
    pub score: f64,

    /// Lowest rank in either channel.
    pub best_rank: u32,

    pub semantic_rank: Option<u32>,

    pub lexical_rank: Option<u32>,
}

impl FusedCandidate {
    fn rank_in(&self, channel: Channel) -> Option<u32> {
        match channel {
            Channel::Semantic => self.semantic_rank,
            Channel::Lexical => self.lexical_rank,
        }
    }

    /// Channels the fragment was found in.
    pub fn channels(&self) -> Vec<Channel> {
        [Channel::Semantic, Channel::Lexical]
            .into_iter()
            .filter(|c| self.rank_in(*c).is_some())
            .collect()
    }
}

/// Reciprocal Rank Fusion with a fixed smoothing constant.
#[derive(Debug, Clone, Copy)]
pub struct RrfFusion {
    k: u32,
}

impl RrfFusion {
    /// `k` must be positive.
    pub fn new(k: u32) -> Result<Self> {
        if k == 0 {
            return Err(RecipeError::invalid_argument("RRF constant must be > 0"));
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// Fuse the two ranked lists and keep the best `width`.
    ///
    /// RRF score = Σ 1 / (k + rank) over channels. Ties go to the lower
    /// best rank, then to the smaller fragment id, so the result depends on
    /// nothing but the inputs.
    pub fn fuse(
        &self,
        semantic: &[RankedCandidate],
        lexical: &[RankedCandidate],
        width: usize,
    ) -> Vec<FusedCandidate> {
        let mut fused: HashMap<&FragmentId, FusedCandidate> = HashMap::new();

        for (channel, list) in [(Channel::Semantic, semantic), (Channel::Lexical, lexical)] {
            for (rank, fragment_id) in best_ranks(list) {
                let entry = fused.entry(fragment_id).or_insert_with(|| FusedCandidate {
                    fragment_id: fragment_id.clone(),
                    score: 0.0,
                    best_rank: rank,
                    semantic_rank: None,
                    lexical_rank: None,
                });
                entry.score += 1.0 / (self.k as f64 + rank as f64);
                entry.best_rank = entry.best_rank.min(rank);
                match channel {
                    Channel::Semantic => entry.semantic_rank = Some(rank),
                    Channel::Lexical => entry.lexical_rank = Some(rank),
                }
            }
        }

        let mut ranked: Vec<FusedCandidate> = fused.into_values().collect();
        ranked.sort_by(compare);
        ranked.truncate(width);
        ranked
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

/// Fuse with the given constant. See [`RrfFusion::fuse`].
pub fn reciprocal_rank_fusion(
    semantic: &[RankedCandidate],
    lexical: &[RankedCandidate],
    k: u32,
    width: usize,
) -> Result<Vec<FusedCandidate>> {
    Ok(RrfFusion::new(k)?.fuse(semantic, lexical, width))
}

/// Each fragment once, at its best rank within the list.
fn best_ranks(list: &[RankedCandidate]) -> Vec<(u32, &FragmentId)> {
    let mut best: HashMap<&FragmentId, u32> = HashMap::with_capacity(list.len());
    for candidate in list {
        let rank = candidate.rank.max(1);
        best.entry(&candidate.fragment_id)
            .and_modify(|r| *r = (*r).min(rank))
            .or_insert(rank);
    }
    best.into_iter().map(|(id, rank)| (rank, id)).collect()
}

fn compare(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.best_rank.cmp(&b.best_rank))
        .then_with(|| a.fragment_id.cmp(&b.fragment_id))
}
