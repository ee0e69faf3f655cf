//! LLM provider implementations
//!
//! Concrete implementations of the LlmProvider trait for each upstream vendor.

pub mod anthropic;
pub mod openai;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};
