//! recipe-chunk - Structural chunking of recipe documents
//!
//! Splits markdown recipes into ordered fragments along their heading
//! structure and loads a recipe corpus from disk.
//!
//! # Components
//!
//! - [`HeadingChunker`]: one fragment per `#`/`##`/`###` heading, heading
//!   text retained so each fragment reads on its own.
//!
//! - [`CorpusLoader`]: walks a directory of `*.md` recipes, derives stable
//!   ids and attributes (category, difficulty, dish name) and chunks each
//!   recipe.
//!
//! # Example
//!
//! ```rust
//! use recipe_chunk::{Chunker, HeadingChunker};
//!
//! let chunker = HeadingChunker::new();
//! let drafts = chunker.chunk("# Tomato egg\n\n## Ingredients\n\n- 2 eggs\n");
//! assert_eq!(drafts.len(), 2);
//! ```

mod attributes;
mod heading;
mod loader;

pub use attributes::enrich_attributes;
pub use heading::{HeadingChunker, EMPTY_DOCUMENT_MARKER};
pub use loader::{CorpusLoader, LoadedDocument};

// Re-export types for convenience
pub use recipe_core::{Chunker, Fragment, FragmentDraft, Recipe};
