//! Error types for routing, health probing and dispatch
//!
//! `RelayError` is the crate-level error. `AgentError` describes why a single
//! agent invocation failed and is carried inside `AllAgentsExhausted` so the
//! caller can see the last underlying cause.

use crate::config::ConfigError;
use crate::llm::provider::LlmError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Maximum length of an error message surfaced to end users
const MAX_USER_MESSAGE_LEN: usize = 500;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid secret pattern")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("valid path pattern")
});

/// Main error type for relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Health probe for '{component}' timed out after {timeout_ms}ms")]
    ProbeTimeout { component: String, timeout_ms: u64 },

    #[error("Component '{component}' reported unhealthy: {message}")]
    ComponentUnhealthy { component: String, message: String },

    #[error("No healthy agent available: {reason}")]
    NoHealthyAgent { reason: String },

    #[error("All agents exhausted after {attempts} attempt(s), last error: {last_error}")]
    AllAgentsExhausted {
        attempts: usize,
        last_error: AgentError,
    },

    #[error("System setup failed: {message}")]
    SetupFailure { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Component check failed: {message}")]
    CheckFailed { message: String },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Agent error: {0}")]
    AgentError(#[from] AgentError),
}

/// Why a single agent invocation failed
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("LLM provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("Agent timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Agent attempt was cancelled")]
    Cancelled,

    #[error("Agent returned an empty response")]
    EmptyResponse,

    #[error("Agent failed: {0}")]
    Failed(String),
}

impl RelayError {
    /// Create no-healthy-agent error
    pub fn no_healthy_agent<S: Into<String>>(reason: S) -> Self {
        Self::NoHealthyAgent {
            reason: reason.into(),
        }
    }

    /// Create setup failure
    pub fn setup_failure<S: Into<String>>(message: S) -> Self {
        Self::SetupFailure {
            message: message.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an explicit unhealthy signal for a component
    pub fn component_unhealthy<C: Into<String>, S: Into<String>>(component: C, message: S) -> Self {
        Self::ComponentUnhealthy {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a generic check failure (transport or processing error)
    pub fn check_failed<S: Into<String>>(message: S) -> Self {
        Self::CheckFailed {
            message: message.into(),
        }
    }

    /// Whether the caller should render a degraded response instead of failing
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            RelayError::NoHealthyAgent { .. }
                | RelayError::AllAgentsExhausted { .. }
                | RelayError::SetupFailure { .. }
        )
    }

    /// Message safe to show to end users and logs shipped off-host
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Redact secrets and sensitive paths, cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_USER_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_USER_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_carries_last_cause() {
        let error = RelayError::AllAgentsExhausted {
            attempts: 3,
            last_error: AgentError::Timeout { timeout_ms: 2000 },
        };

        let message = error.to_string();
        assert!(message.contains("3 attempt"));
        assert!(message.contains("2000ms"));
        assert!(error.is_degradable());
    }

    #[test]
    fn test_setup_failure_is_degradable() {
        assert!(RelayError::setup_failure("missing key").is_degradable());
        assert!(RelayError::no_healthy_agent("none").is_degradable());
        assert!(!RelayError::invalid_input("empty").is_degradable());
    }

    #[test]
    fn test_llm_error_converts_into_agent_error() {
        let agent_error: AgentError = LlmError::RateLimitExceeded("slow down".to_string()).into();
        assert!(matches!(agent_error, AgentError::Llm(_)));
        assert!(agent_error.to_string().contains("slow down"));
    }

    #[test]
    fn test_user_message_redacts_secrets() {
        let error = RelayError::setup_failure("bad credentials: api_key=sk-12345 token: abc");
        let message = error.user_message();

        assert!(!message.contains("sk-12345"));
        assert!(!message.contains("abc"));
        assert!(message.contains("key=***"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized = sanitize_error_message("Failed to read /home/user/.aws/credentials");

        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains(".aws/credentials"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));

        assert!(sanitized.len() <= MAX_USER_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"é".repeat(400));
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_exactly_max_len_is_untouched() {
        let message = "x".repeat(MAX_USER_MESSAGE_LEN);
        assert_eq!(sanitize_error_message(&message), message);
    }
}
