//! recipe-assistant - Recipe question answering
//!
//! Ties the workspace together: loads the markdown corpus, reopens or
//! rebuilds its snapshot, and answers questions by routing, hybrid
//! retrieval and generation.
//!
//! # Example
//!
//! ```rust,ignore
//! use recipe_assistant::RecipeAssistant;
//!
//! let assistant = RecipeAssistant::open(config, embedder, Some(generator)).await?;
//! let answer = assistant.ask("推荐几道简单的素菜").await?;
//! println!("{}", answer.answer);
//! ```

mod assistant;

pub use assistant::{Answer, CorpusReport, RecipeAssistant, RecipeMetadata, RecipeSummary};
