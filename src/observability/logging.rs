//! Structured logging using the tracing crate
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (default INFO)
//! - `LOG_FORMAT`: json, pretty or compact (default json)
//! - `LOG_SPANS`: emit span open/close events when `true` (default false)
//! - `RUST_LOG`: replaces the computed filter entirely
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG agentrelay serve
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies that are only interesting when something is wrong
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "warp", "tokio", "h2", "rustls"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON, one object per line
    Json,
    /// Multi-line, coloured output for development
    Pretty,
    /// Single-line coloured output
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to JSON
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            include_spans: false,
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_values(
            env::var("LOG_LEVEL").ok().as_deref(),
            env::var("LOG_FORMAT").ok().as_deref(),
            env::var("LOG_SPANS").ok().as_deref(),
        )
    }

    /// Resolve from raw variable values; missing or invalid values use defaults
    pub fn from_values(level: Option<&str>, format: Option<&str>, spans: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            level: level.map(parse_level).unwrap_or(defaults.level),
            format: format.map(LogFormat::parse).unwrap_or(defaults.format),
            include_spans: spans.is_some_and(|s| s.trim().eq_ignore_ascii_case("true")),
        }
    }
}

pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Filter at `level` with noisy dependencies capped at warn
pub fn build_filter(level: Level) -> EnvFilter {
    QUIET_TARGETS
        .iter()
        .filter_map(|target| format!("{target}=warn").parse::<Directive>().ok())
        .fold(EnvFilter::new(level.to_string()), |filter, directive| {
            filter.add_directive(directive)
        })
}

/// Install the global subscriber; a second call is a no-op
pub fn init_logging(settings: LogSettings) {
    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => build_filter(settings.level),
    };
    let span_events = if settings.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber = tracing_subscriber::registry().with(filter);
    let result = match settings.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_span_events(span_events))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(span_events),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Initialize logging from environment variables
pub fn init_default_logging() {
    init_logging(LogSettings::from_env());
}

/// Span covering one dispatch, from selection to the final attempt
#[macro_export]
macro_rules! dispatch_span {
    ($($field:tt)*) => {
        tracing::info_span!("dispatch", $($field)*)
    };
}

/// Span covering one health probe cycle
#[macro_export]
macro_rules! probe_span {
    ($($field:tt)*) => {
        tracing::info_span!("health_probe", $($field)*)
    };
}

/// Span for system lifecycle transitions
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("lifecycle_event", $($field)*)
    };
}

pub use {dispatch_span, lifecycle_span, probe_span};
