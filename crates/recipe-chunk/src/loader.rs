//! Corpus loading: markdown files on disk to recipes and fragments.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use recipe_core::{Chunker, Fragment, Recipe, RecipeError, Result};

use crate::attributes::enrich_attributes;
use crate::HeadingChunker;

/// A recipe together with its fragments, ready for registration.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub recipe: Recipe,
    pub fragments: Vec<Fragment>,
}

/// Loads every `*.md` recipe under a root directory.
pub struct CorpusLoader<C: Chunker = HeadingChunker> {
    root: PathBuf,
    chunker: C,
}

impl CorpusLoader<HeadingChunker> {
    /// Create a loader using the default heading chunker.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_chunker(root, HeadingChunker::new())
    }
}

impl<C: Chunker> CorpusLoader<C> {
    pub fn with_chunker(root: impl Into<PathBuf>, chunker: C) -> Self {
        Self {
            root: root.into(),
            chunker,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load and chunk the whole corpus, in path order.
    ///
    /// Unreadable files are logged and skipped. A corpus with no readable
    /// recipes is an [`RecipeError::EmptyCorpus`].
    pub fn load(&self) -> Result<Vec<LoadedDocument>> {
        info!("Loading recipes from {:?}", self.root);

        if !self.root.is_dir() {
            return Err(RecipeError::EmptyCorpus {
                path: self.root.display().to_string(),
            });
        }

        let mut documents = Vec::new();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            let relative = self.relative_path(path);
            documents.push(self.build_document(&relative, &content));
        }

        if documents.is_empty() {
            return Err(RecipeError::EmptyCorpus {
                path: self.root.display().to_string(),
            });
        }

        let fragments: usize = documents.iter().map(|d| d.fragments.len()).sum();
        info!(
            "Loaded {} recipes, {} fragments",
            documents.len(),
            fragments
        );

        Ok(documents)
    }

    /// Build one document from its corpus-relative path and raw content.
    pub fn build_document(&self, relative_path: &str, content: &str) -> LoadedDocument {
        let name = Path::new(relative_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(relative_path);

        let mut recipe = Recipe::new(relative_path, name, content);
        enrich_attributes(&mut recipe);

        let drafts = self.chunker.chunk(content);
        if drafts.len() == 1 && drafts[0].header_path.is_empty() {
            warn!("{} has no markdown headings, indexed as one fragment", relative_path);
        }

        let fragments: Vec<Fragment> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| Fragment::from_draft(&recipe, i as u32, draft))
            .collect();

        recipe.fragment_ids = fragments.iter().map(|f| f.id.clone()).collect();

        debug!("{} split into {} fragments", relative_path, fragments.len());

        LoadedDocument { recipe, fragments }
    }

    /// Path relative to the root, `/`-separated.
    fn relative_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}
