//! Collapse fused fragments into an ordered, deduplicated parent list.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use recipe_core::{FragmentId, ParentId, Recipe};
use recipe_store::ParentRegistry;

use crate::fusion::FusedCandidate;

/// What to do with a fused fragment whose parent cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Treat it as a bug and panic.
    Panic,
    /// Log at error level and leave the fragment out.
    Skip,
}

impl Default for OrphanPolicy {
    /// Panic in debug builds, skip in release builds.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Skip
        }
    }
}

/// A parent recipe and the fused fragments that selected it.
#[derive(Debug, Clone)]
pub struct AggregatedParent {
    pub parent: Arc<Recipe>,

    /// Number of its fragments in the fused list.
    pub tally: usize,

    /// Position (0-based) of its best fragment in the fused list.
    pub first_position: usize,

    /// Contributing fragments, in fused order.
    pub fragment_ids: Vec<FragmentId>,

    /// Sum of the contributing fragments' fusion scores.
    pub fused_score: f64,
}

/// Groups fused fragments by parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAggregator {
    policy: OrphanPolicy,
}

impl ResultAggregator {
    pub fn new(policy: OrphanPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OrphanPolicy {
        self.policy
    }

    /// Order parents by tally, ties by where each first appears in `fused`.
    ///
    /// Each parent appears once. Empty input gives empty output.
    pub fn aggregate_parents(
        &self,
        fused: &[FusedCandidate],
        registry: &ParentRegistry,
    ) -> Vec<AggregatedParent> {
        let mut parents: Vec<AggregatedParent> = Vec::new();
        let mut slots: HashMap<ParentId, usize> = HashMap::new();

        for (position, candidate) in fused.iter().enumerate() {
            let parent = match registry.resolve_parent(&candidate.fragment_id) {
                Ok(parent) => parent,
                Err(e) => match self.policy {
                    OrphanPolicy::Panic => panic!("{}", e),
                    OrphanPolicy::Skip => {
                        error!("{} (skipped)", e);
                        continue;
                    }
                },
            };

            let slot = *slots.entry(parent.id.clone()).or_insert_with(|| {
                parents.push(AggregatedParent {
                    parent: Arc::clone(&parent),
                    tally: 0,
                    first_position: position,
                    fragment_ids: Vec::new(),
                    fused_score: 0.0,
                });
                parents.len() - 1
            });

            let entry = &mut parents[slot];
            entry.tally += 1;
            entry.fragment_ids.push(candidate.fragment_id.clone());
            entry.fused_score += candidate.score;
        }

        // Stable: equal tallies keep first-appearance order
        parents.sort_by(|a, b| {
            b.tally
                .cmp(&a.tally)
                .then_with(|| a.first_position.cmp(&b.first_position))
        });
        parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_core::{Fragment, FragmentDraft};

    /// Parents "A".."C" with `n` fragments each.
    fn registry(spec: &[(&str, u32)]) -> ParentRegistry {
        let mut registry = ParentRegistry::new();
        for (name, n) in spec {
            let recipe = Recipe::new(&format!("{}.md", name), name, "x");
            let fragments = (0..*n)
                .map(|i| {
                    Fragment::from_draft(
                        &recipe,
                        i,
                        FragmentDraft {
                            header_path: Vec::new(),
                            content: format!("{} {}", name, i),
                        },
                    )
                })
                .collect();
            let id = recipe.id.clone();
            registry.register(recipe);
            registry.link_fragments(&id, fragments).unwrap();
        }
        registry
    }

    fn fragment(name: &str, index: u32) -> FragmentId {
        FragmentId::for_parent(&ParentId::from_relative_path(&format!("{}.md", name)), index)
    }

    fn fused(ids: &[FragmentId]) -> Vec<FusedCandidate> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| FusedCandidate {
                fragment_id: id.clone(),
                score: 1.0 / (61.0 + i as f64),
                best_rank: i as u32 + 1,
                semantic_rank: Some(i as u32 + 1),
                lexical_rank: None,
            })
            .collect()
    }

    fn names(parents: &[AggregatedParent]) -> Vec<&str> {
        parents.iter().map(|p| p.parent.name.as_str()).collect()
    }

    #[test]
    fn test_deduplicates_by_tally() {
        let registry = registry(&[("A", 5), ("B", 1)]);
        // B's only fragment is ranked first, but A has four
        let input = fused(&[
            fragment("B", 0),
            fragment("A", 0),
            fragment("A", 1),
            fragment("A", 2),
            fragment("A", 3),
        ]);

        let parents = ResultAggregator::new(OrphanPolicy::Skip).aggregate_parents(&input, &registry);

        assert_eq!(names(&parents), vec!["A", "B"]);
        assert_eq!(parents[0].tally, 4);
        assert_eq!(parents[0].first_position, 1);
        assert_eq!(parents[0].fragment_ids[0], fragment("A", 0));
        assert_eq!(parents[1].tally, 1);
    }

    #[test]
    fn test_ties_keep_first_appearance_order() {
        let registry = registry(&[("A", 2), ("B", 2), ("C", 2)]);
        let input = fused(&[
            fragment("C", 0),
            fragment("A", 1),
            fragment("B", 0),
            fragment("A", 0),
            fragment("C", 1),
            fragment("B", 1),
        ]);

        let parents = ResultAggregator::new(OrphanPolicy::Skip).aggregate_parents(&input, &registry);
        assert_eq!(names(&parents), vec!["C", "A", "B"]);
        assert_eq!(parents[1].fragment_ids, vec![fragment("A", 1), fragment("A", 0)]);
    }

    #[test]
    fn test_fused_score_is_summed() {
        let registry = registry(&[("A", 2)]);
        let input = fused(&[fragment("A", 0), fragment("A", 1)]);
        let parents = ResultAggregator::default().aggregate_parents(&input, &registry);
        assert!((parents[0].fused_score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        let registry = registry(&[("A", 1)]);
        assert!(ResultAggregator::default()
            .aggregate_parents(&[], &registry)
            .is_empty());
    }

    #[test]
    fn test_skip_policy_drops_orphans() {
        let registry = registry(&[("A", 1)]);
        let input = fused(&[FragmentId::new("ghost-000"), fragment("A", 0)]);

        let parents = ResultAggregator::new(OrphanPolicy::Skip).aggregate_parents(&input, &registry);
        assert_eq!(names(&parents), vec!["A"]);
        assert_eq!(parents[0].first_position, 1);
    }

    #[test]
    #[should_panic(expected = "ghost-000")]
    fn test_panic_policy_panics_on_orphan() {
        let registry = registry(&[("A", 1)]);
        let input = fused(&[FragmentId::new("ghost-000")]);
        ResultAggregator::new(OrphanPolicy::Panic).aggregate_parents(&input, &registry);
    }

    #[test]
    fn test_default_policy_follows_build_profile() {
        let expected = if cfg!(debug_assertions) {
            OrphanPolicy::Panic
        } else {
            OrphanPolicy::Skip
        };
        assert_eq!(OrphanPolicy::default(), expected);
    }
}
