//! Query routing: intent classification and search-query rewriting.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use recipe_core::{Generator, Intent, RecipeError};

/// A query after routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutedQuery {
    pub intent: Intent,

    /// Query to hand the retriever.
    pub search_query: String,

    /// Whether `search_query` differs from what the user typed.
    pub rewritten: bool,
}

/// Decides how a query is answered.
///
/// Classification never fails: an unusable classifier answer routes the
/// query as [`Intent::General`].
pub struct QueryRouter {
    generator: Arc<dyn Generator>,
}

impl QueryRouter {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Classify `query` as list, detail or general.
    pub async fn classify(&self, query: &str) -> Intent {
        let label = match self.generator.classify(query).await {
            Ok(label) => label,
            Err(e) => {
                let failure = RecipeError::ClassifierFailure {
                    message: e.to_string(),
                };
                warn!("{}, routing as general", failure);
                return Intent::General;
            }
        };

        match Intent::parse_label(&label) {
            Some(intent) => intent,
            None => {
                let failure = RecipeError::ClassifierFailure {
                    message: format!("unrecognized label {:?}", label),
                };
                warn!("{}, routing as general", failure);
                Intent::General
            }
        }
    }

    /// Classify, then rewrite vague queries for search.
    ///
    /// List queries keep their wording: the dish names they ask for are
    /// already the best keywords.
    pub async fn route(&self, query: &str) -> RoutedQuery {
        let intent = self.classify(query).await;

        let search_query = match intent {
            Intent::List => query.to_string(),
            Intent::Detail | Intent::General => self.rewrite(query).await,
        };
        let rewritten = search_query != query;

        debug!(
            "Routed {:?} as {} (search query {:?})",
            query, intent, search_query
        );

        RoutedQuery {
            intent,
            search_query,
            rewritten,
        }
    }

    async fn rewrite(&self, query: &str) -> String {
        match self.generator.rewrite(query).await {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    query.to_string()
                } else {
                    rewritten.to_string()
                }
            }
            Err(e) => {
                warn!("Query rewrite failed, keeping original: {}", e);
                query.to_string()
            }
        }
    }
}
