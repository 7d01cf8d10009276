//! Parent registry: the one-to-many map from recipes to their fragments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use recipe_core::{
    attr, CorpusStats, Fragment, FragmentId, ParentId, Predicate, Recipe, RecipeError, Result,
};

/// Registry of parent recipes and their fragments.
///
/// Mutated only during corpus load. Afterwards it is frozen inside an
/// `Arc` and every lookup is a plain map read.
#[derive(Debug, Default)]
pub struct ParentRegistry {
    parents: HashMap<ParentId, Arc<Recipe>>,

    /// Parent ids in registration order.
    order: Vec<ParentId>,

    fragments: HashMap<FragmentId, Arc<Fragment>>,

    /// Ordered fragment ids per parent.
    children: HashMap<ParentId, Vec<FragmentId>>,
}

impl ParentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parent. Returns `false` if the id was already registered,
    /// in which case the registry is unchanged.
    pub fn register(&mut self, recipe: Recipe) -> bool {
        if self.parents.contains_key(&recipe.id) {
            return false;
        }
        self.order.push(recipe.id.clone());
        self.parents.insert(recipe.id.clone(), Arc::new(recipe));
        true
    }

    /// Record the ordered fragments of a registered parent.
    ///
    /// Nothing is recorded unless the whole list is valid.
    pub fn link_fragments(&mut self, parent_id: &ParentId, fragments: Vec<Fragment>) -> Result<()> {
        if !self.parents.contains_key(parent_id) {
            return Err(RecipeError::UnknownParent {
                parent_id: parent_id.clone(),
            });
        }
        if fragments.is_empty() {
            return Err(RecipeError::EmptyParent {
                parent_id: parent_id.clone(),
            });
        }
        if self.children.contains_key(parent_id) {
            return Err(RecipeError::invalid_argument(format!(
                "parent {} is already linked",
                parent_id
            )));
        }

        let mut seen = HashSet::with_capacity(fragments.len());
        for fragment in &fragments {
            if &fragment.parent_id != parent_id {
                return Err(RecipeError::ParentMismatch {
                    fragment_id: fragment.id.clone(),
                    expected: fragment.parent_id.clone(),
                    actual: parent_id.clone(),
                });
            }
            if self.fragments.contains_key(&fragment.id) || !seen.insert(&fragment.id) {
                return Err(RecipeError::DuplicateFragment {
                    fragment_id: fragment.id.clone(),
                });
            }
        }

        let ids: Vec<FragmentId> = fragments.iter().map(|f| f.id.clone()).collect();
        for fragment in fragments {
            self.fragments.insert(fragment.id.clone(), Arc::new(fragment));
        }

        if let Some(parent) = self.parents.get_mut(parent_id) {
            if parent.fragment_ids != ids {
                Arc::make_mut(parent).fragment_ids = ids.clone();
            }
        }

        debug!("Linked {} fragments to {}", ids.len(), parent_id);
        self.children.insert(parent_id.clone(), ids);
        Ok(())
    }

    /// Check that every registered parent has at least one fragment.
    pub fn validate(&self) -> Result<()> {
        for id in &self.order {
            if self.children.get(id).map_or(true, Vec::is_empty) {
                return Err(RecipeError::EmptyParent {
                    parent_id: id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Find the parent of a fragment.
    ///
    /// An unknown fragment id means the index and registry disagree; callers
    /// on the query path decide whether that panics or is skipped.
    pub fn resolve_parent(&self, fragment_id: &FragmentId) -> Result<Arc<Recipe>> {
        self.fragments
            .get(fragment_id)
            .and_then(|f| self.parents.get(&f.parent_id))
            .cloned()
            .ok_or_else(|| RecipeError::OrphanFragment {
                fragment_id: fragment_id.clone(),
            })
    }

    pub fn parent(&self, id: &ParentId) -> Option<Arc<Recipe>> {
        self.parents.get(id).cloned()
    }

    pub fn fragment(&self, id: &FragmentId) -> Option<Arc<Fragment>> {
        self.fragments.get(id).cloned()
    }

    /// Fragments of a parent in document order (empty if unknown).
    pub fn fragments_of(&self, parent_id: &ParentId) -> Vec<Arc<Fragment>> {
        self.children
            .get(parent_id)
            .map(|ids| ids.iter().filter_map(|id| self.fragments.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Parents in registration order.
    pub fn parents(&self) -> impl Iterator<Item = &Arc<Recipe>> {
        self.order.iter().filter_map(|id| self.parents.get(id))
    }

    /// Every fragment, grouped by parent in registration order.
    pub fn fragments(&self) -> impl Iterator<Item = &Arc<Fragment>> {
        self.order
            .iter()
            .filter_map(|id| self.children.get(id))
            .flatten()
            .filter_map(|id| self.fragments.get(id))
    }

    /// Parents whose attributes satisfy `predicate`.
    pub fn filter_parents(&self, predicate: &Predicate) -> Vec<Arc<Recipe>> {
        self.parents()
            .filter(|p| predicate.matches(&p.attributes))
            .cloned()
            .collect()
    }

    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn stats(&self) -> CorpusStats {
        let mut stats = CorpusStats {
            parents: self.parent_count(),
            fragments: self.fragment_count(),
            ..Default::default()
        };

        for parent in self.parents() {
            let category = parent.attribute_str(attr::CATEGORY).unwrap_or("other");
            *stats.categories.entry(category.to_string()).or_insert(0) += 1;

            let difficulty = parent.attribute_str(attr::DIFFICULTY).unwrap_or("unknown");
            *stats.difficulties.entry(difficulty.to_string()).or_insert(0) += 1;
        }

        if !self.fragments.is_empty() {
            let chars: usize = self.fragments.values().map(|f| f.content.chars().count()).sum();
            stats.avg_fragment_chars = chars as f64 / self.fragments.len() as f64;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_core::FragmentDraft;
    use serde_json::json;

    fn recipe(source: &str, category: &str) -> Recipe {
        let mut r = Recipe::new(source, source, "# x");
        r.attributes.insert(attr::CATEGORY.to_string(), json!(category));
        r
    }

    fn fragments(parent: &Recipe, n: u32) -> Vec<Fragment> {
        (0..n)
            .map(|i| {
                Fragment::from_draft(
                    parent,
                    i,
                    FragmentDraft {
                        header_path: vec![format!("section {}", i)],
                        content: format!("content {}", i),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = ParentRegistry::new();
        let r = recipe("a.md", "meat");
        assert!(registry.register(r.clone()));
        assert!(!registry.register(r));
        assert_eq!(registry.parent_count(), 1);
    }

    #[test]
    fn test_every_fragment_resolves_to_its_parent() {
        let mut registry = ParentRegistry::new();
        let a = recipe("a.md", "meat");
        let b = recipe("b.md", "soup");
        let (fa, fb) = (fragments(&a, 3), fragments(&b, 2));
        registry.register(a.clone());
        registry.register(b.clone());
        registry.link_fragments(&a.id, fa.clone()).unwrap();
        registry.link_fragments(&b.id, fb.clone()).unwrap();

        for f in fa.iter() {
            assert_eq!(registry.resolve_parent(&f.id).unwrap().id, a.id);
        }
        for f in fb.iter() {
            assert_eq!(registry.resolve_parent(&f.id).unwrap().id, b.id);
        }
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_fragments_of_preserves_order() {
        let mut registry = ParentRegistry::new();
        let a = recipe("a.md", "meat");
        registry.register(a.clone());
        registry.link_fragments(&a.id, fragments(&a, 4)).unwrap();

        let indices: Vec<u32> = registry.fragments_of(&a.id).iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(registry.parent(&a.id).unwrap().fragment_ids.len(), 4);
    }

    #[test]
    fn test_unknown_fragment_is_orphan() {
        let registry = ParentRegistry::new();
        let err = registry.resolve_parent(&FragmentId::new("nope-000")).unwrap_err();
        assert_eq!(err.error_code(), "ORPHAN_FRAGMENT");
    }

    #[test]
    fn test_link_rejects_structural_violations() {
        let mut registry = ParentRegistry::new();
        let a = recipe("a.md", "meat");
        let b = recipe("b.md", "meat");
        registry.register(a.clone());

        let err = registry.link_fragments(&b.id, fragments(&b, 1)).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownParent { .. }));

        let err = registry.link_fragments(&a.id, Vec::new()).unwrap_err();
        assert!(matches!(err, RecipeError::EmptyParent { .. }));

        let err = registry.link_fragments(&a.id, fragments(&b, 1)).unwrap_err();
        assert!(matches!(err, RecipeError::ParentMismatch { .. }));

        let mut dup = fragments(&a, 1);
        dup.push(dup[0].clone());
        let err = registry.link_fragments(&a.id, dup).unwrap_err();
        assert!(matches!(err, RecipeError::DuplicateFragment { .. }));

        // Nothing was recorded by the failed attempts
        assert_eq!(registry.fragment_count(), 0);
    }

    #[test]
    fn test_validate_catches_unlinked_parent() {
        let mut registry = ParentRegistry::new();
        registry.register(recipe("a.md", "meat"));
        assert!(matches!(
            registry.validate(),
            Err(RecipeError::EmptyParent { .. })
        ));
    }

    #[test]
    fn test_filter_parents_and_stats() {
        let mut registry = ParentRegistry::new();
        for (source, category) in [("a.md", "meat"), ("b.md", "vegetable"), ("c.md", "vegetable")] {
            let r = recipe(source, category);
            let f = fragments(&r, 2);
            registry.register(r.clone());
            registry.link_fragments(&r.id, f).unwrap();
        }

        let veg = registry.filter_parents(&Predicate::new().equals(attr::CATEGORY, "vegetable"));
        assert_eq!(veg.len(), 2);

        let stats = registry.stats();
        assert_eq!(stats.parents, 3);
        assert_eq!(stats.fragments, 6);
        assert_eq!(stats.categories["vegetable"], 2);
        assert_eq!(stats.difficulties["unknown"], 3);
        assert!((stats.avg_fragment_chars - 9.0).abs() < f64::EPSILON);
    }
}
