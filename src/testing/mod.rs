//! Testing utilities and mock implementations
//!
//! Mocks for health checks, LLM providers and agents so the relay can be
//! tested without upstream model APIs or functional endpoints.

pub mod mocks;

pub use mocks::*;
