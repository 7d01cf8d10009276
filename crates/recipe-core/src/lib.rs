//! recipe-core - Core types and traits for cookrag
//!
//! This crate provides the foundational types, collaborator traits, metadata
//! predicates and error handling shared by every other crate in the
//! workspace.

pub mod config;
pub mod error;
pub mod predicate;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RecipeError, Result};
pub use predicate::{Comparison, Condition, Predicate};
pub use traits::*;
pub use types::*;
