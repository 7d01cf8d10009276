//! Error types for cookrag.

use thiserror::Error;

use crate::types::{Channel, FragmentId, ParentId};

/// Result type alias using RecipeError.
pub type Result<T> = std::result::Result<T, RecipeError>;

/// Errors that can occur while building or querying the recipe corpus.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// No documents were found to index.
    #[error("Empty corpus: no recipe documents found under {path}")]
    EmptyCorpus { path: String },

    /// A fragment whose parent cannot be resolved.
    #[error("Orphan fragment: {fragment_id} has no registered parent")]
    OrphanFragment { fragment_id: FragmentId },

    /// A parent was linked with zero fragments.
    #[error("Parent {parent_id} has no fragments")]
    EmptyParent { parent_id: ParentId },

    /// Fragments were linked to a parent that was never registered.
    #[error("Unknown parent: {parent_id}")]
    UnknownParent { parent_id: ParentId },

    /// A fragment id was linked twice.
    #[error("Duplicate fragment: {fragment_id}")]
    DuplicateFragment { fragment_id: FragmentId },

    /// A fragment's back-reference names a different parent than the one it is linked to.
    #[error("Fragment {fragment_id} belongs to {expected}, not {actual}")]
    ParentMismatch {
        fragment_id: FragmentId,
        expected: ParentId,
        actual: ParentId,
    },

    /// A search channel failed or timed out.
    #[error("{channel} channel unavailable: {reason}")]
    ChannelUnavailable { channel: Channel, reason: String },

    /// The intent classifier failed.
    #[error("Classifier failure: {message}")]
    ClassifierFailure { message: String },

    /// A metadata filter removed every candidate.
    #[error("Filter removed all {dropped} candidates")]
    FilterOverRestrictive { dropped: usize },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Snapshot missing, corrupt or stale.
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Text generation error.
    #[error("Generation error: {message}")]
    Generation { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RecipeError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error is a corpus-load structural violation.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::EmptyCorpus { .. }
                | Self::EmptyParent { .. }
                | Self::UnknownParent { .. }
                | Self::DuplicateFragment { .. }
                | Self::ParentMismatch { .. }
        )
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCorpus { .. } => "EMPTY_CORPUS",
            Self::OrphanFragment { .. } => "ORPHAN_FRAGMENT",
            Self::EmptyParent { .. } => "EMPTY_PARENT",
            Self::UnknownParent { .. } => "UNKNOWN_PARENT",
            Self::DuplicateFragment { .. } => "DUPLICATE_FRAGMENT",
            Self::ParentMismatch { .. } => "PARENT_MISMATCH",
            Self::ChannelUnavailable { .. } => "CHANNEL_UNAVAILABLE",
            Self::ClassifierFailure { .. } => "CLASSIFIER_FAILURE",
            Self::FilterOverRestrictive { .. } => "FILTER_OVER_RESTRICTIVE",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Snapshot { .. } => "SNAPSHOT_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Generation { .. } => "GENERATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
