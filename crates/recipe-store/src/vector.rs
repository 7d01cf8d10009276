//! Exact cosine-similarity search over fragment embeddings.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use recipe_core::{
    Fragment, FragmentId, Predicate, RankedCandidate, RecipeError, Result, SemanticBackend,
};

use crate::registry::ParentRegistry;

struct Entry {
    fragment: Arc<Fragment>,
    /// Unit-normalized embedding.
    vector: Vec<f32>,
}

/// Brute-force vector index held in memory.
///
/// Recipe corpora are a few thousand fragments at most, so an exact scan is
/// fast enough and needs no ANN structure. The filter is applied before
/// truncation.
pub struct FlatVectorIndex {
    dimension: usize,
    entries: Vec<Entry>,
}

impl FlatVectorIndex {
    /// Build from `(fragment id, embedding)` pairs, resolving attributes
    /// through the registry.
    ///
    /// Embeddings for unknown fragments are an error: they would surface as
    /// orphans at query time.
    pub fn build(
        registry: &ParentRegistry,
        embeddings: Vec<(FragmentId, Vec<f32>)>,
        dimension: usize,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(embeddings.len());

        for (fragment_id, vector) in embeddings {
            if vector.len() != dimension {
                return Err(RecipeError::embedding(format!(
                    "embedding for {} has dimension {}, expected {}",
                    fragment_id,
                    vector.len(),
                    dimension
                )));
            }
            let fragment = registry
                .fragment(&fragment_id)
                .ok_or(RecipeError::OrphanFragment { fragment_id })?;
            entries.push(Entry {
                fragment,
                vector: normalize(vector),
            });
        }

        if entries.len() < registry.fragment_count() {
            warn!(
                "{} of {} fragments have no embedding",
                registry.fragment_count() - entries.len(),
                registry.fragment_count()
            );
        }

        Ok(Self { dimension, entries })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SemanticBackend for FlatVectorIndex {
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&Predicate>,
    ) -> Result<Vec<RankedCandidate>> {
        if embedding.len() != self.dimension {
            return Err(RecipeError::embedding(format!(
                "query embedding has dimension {}, index has {}",
                embedding.len(),
                self.dimension
            )));
        }

        let query = normalize(embedding.to_vec());
        let mut scored: Vec<(&Entry, f32)> = self
            .entries
            .iter()
            .filter(|e| filter.map_or(true, |p| p.matches(&e.fragment.attributes)))
            .map(|e| (e, dot(&query, &e.vector)))
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.fragment.id.cmp(&b.fragment.id))
        });
        scored.truncate(k);

        debug!("Vector search: {} candidates", scored.len());
        Ok(RankedCandidate::rank_list(
            scored
                .into_iter()
                .map(|(e, score)| (e.fragment.id.clone(), score)),
        ))
    }

    fn supports_prefilter(&self) -> bool {
        true
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_core::{attr, FragmentDraft, Recipe};
    use serde_json::json;

    fn registry_with(specs: &[(&str, &str)]) -> (ParentRegistry, Vec<FragmentId>) {
        let mut registry = ParentRegistry::new();
        let mut ids = Vec::new();
        for (source, category) in specs {
            let mut recipe = Recipe::new(source, source, "x");
            recipe.attributes.insert(attr::CATEGORY.to_string(), json!(category));
            let fragment = Fragment::from_draft(
                &recipe,
                0,
                FragmentDraft {
                    header_path: Vec::new(),
                    content: "x".to_string(),
                },
            );
            ids.push(fragment.id.clone());
            let id = recipe.id.clone();
            registry.register(recipe);
            registry.link_fragments(&id, vec![fragment]).unwrap();
        }
        (registry, ids)
    }

    #[tokio::test]
    async fn test_cosine_ranking() {
        let (registry, ids) = registry_with(&[("a.md", "meat"), ("b.md", "meat"), ("c.md", "soup")]);
        let index = FlatVectorIndex::build(
            &registry,
            vec![
                (ids[0].clone(), vec![1.0, 0.0]),
                (ids[1].clone(), vec![0.6, 0.8]),
                (ids[2].clone(), vec![0.0, 1.0]),
            ],
            2,
        )
        .unwrap();

        let results = index.search(&[2.0, 0.1], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fragment_id, ids[0]);
        assert_eq!(results[1].fragment_id, ids[1]);
        assert_eq!(results[1].rank, 2);
    }

    #[tokio::test]
    async fn test_prefilter_applies_before_truncation() {
        let (registry, ids) = registry_with(&[("a.md", "meat"), ("b.md", "meat"), ("c.md", "soup")]);
        let index = FlatVectorIndex::build(
            &registry,
            vec![
                (ids[0].clone(), vec![1.0, 0.0]),
                (ids[1].clone(), vec![0.9, 0.1]),
                (ids[2].clone(), vec![0.0, 1.0]),
            ],
            2,
        )
        .unwrap();

        // The soup fragment is the least similar but the only one allowed
        let filter = Predicate::new().equals(attr::CATEGORY, "soup");
        let results = index.search(&[1.0, 0.0], 1, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment_id, ids[2]);
    }

    #[tokio::test]
    async fn test_equal_scores_order_by_id() {
        let (registry, ids) = registry_with(&[("a.md", "meat"), ("b.md", "meat")]);
        let index = FlatVectorIndex::build(
            &registry,
            vec![(ids[1].clone(), vec![1.0, 0.0]), (ids[0].clone(), vec![1.0, 0.0])],
            2,
        )
        .unwrap();

        let results = index.search(&[1.0, 0.0], 2, None).await.unwrap();
        let mut expected = ids.clone();
        expected.sort();
        let got: Vec<_> = results.into_iter().map(|r| r.fragment_id).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let (registry, ids) = registry_with(&[("a.md", "meat")]);
        assert!(FlatVectorIndex::build(&registry, vec![(ids[0].clone(), vec![1.0])], 2).is_err());

        let index = FlatVectorIndex::build(&registry, vec![(ids[0].clone(), vec![1.0, 0.0])], 2).unwrap();
        let err = index.search(&[1.0], 1, None).await.unwrap_err();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }

    #[test]
    fn test_unknown_fragment_rejected() {
        let (registry, _) = registry_with(&[("a.md", "meat")]);
        let built = FlatVectorIndex::build(&registry, vec![(FragmentId::new("zz-000"), vec![1.0])], 1);
        assert!(matches!(built, Err(RecipeError::OrphanFragment { .. })));
    }
}
