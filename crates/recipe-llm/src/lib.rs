//! recipe-llm - Language-model integration
//!
//! - [`ChatGenerator`]: a [`Generator`] over an OpenAI-compatible
//!   chat-completions endpoint (Moonshot by default), with streamed replies.
//! - [`prompts`]: intent classification, query rewrite and answer templates.
//! - [`AnswerComposer`]: builds the recipe context and answers by intent.

mod client;
mod compose;
pub mod prompts;
mod sse;

pub use client::{ChatGenerator, ChatMessage};
pub use compose::{
    build_context, list_answer, AnswerComposer, DEFAULT_CONTEXT_MAX_CHARS, NO_RECIPES_ANSWER,
    NO_RECIPES_CONTEXT,
};

// Re-export the Generator trait for convenience
pub use recipe_core::Generator;
