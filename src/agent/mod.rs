//! Agents, their capabilities and the request/response model

pub mod capability;
pub mod llm_agent;
pub mod request;

pub use capability::{Capability, CapabilitySet};
pub use llm_agent::{Agent, LlmAgent};
pub use request::{
    AgentOutput, AgentRequest, AgentResponse, RequestPreferences, ResponseMetadata,
    GRACEFUL_RESPONSE_TEXT,
};
