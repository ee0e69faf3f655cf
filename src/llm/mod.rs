//! LLM provider abstraction layer
//!
//! Provider-agnostic interface for model backends (Anthropic, OpenAI).

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
