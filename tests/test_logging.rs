//! Tests for logging configuration and format parsing

use agentrelay::observability::logging::{
    build_filter, init_default_logging, init_logging, parse_level, LogFormat, LogSettings,
};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_and_whitespace_insensitive() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("\tCompact\n"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    for input in ["invalid", "", "xml", "yaml", "123"] {
        assert_eq!(LogFormat::parse(input), LogFormat::Json, "input: {input:?}");
    }
}

#[test]
fn test_settings_from_values() {
    let settings = LogSettings::from_values(Some("debug"), Some("compact"), Some("TRUE"));
    assert_eq!(settings.level, Level::DEBUG);
    assert_eq!(settings.format, LogFormat::Compact);
    assert!(settings.include_spans);
}

#[test]
fn test_settings_missing_values_use_defaults() {
    let settings = LogSettings::from_values(None, None, None);
    assert_eq!(settings, LogSettings::default());
    assert_eq!(settings.level, Level::INFO);
    assert_eq!(settings.format, LogFormat::Json);
    assert!(!settings.include_spans);
}

#[test]
fn test_unknown_level_falls_back_to_info() {
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(" warn "), Level::WARN);
}

#[test]
fn test_filter_quiets_http_dependencies() {
    let rendered = build_filter(Level::DEBUG).to_string();
    assert!(rendered.contains("hyper=warn"), "filter: {rendered}");
    assert!(rendered.contains("reqwest=warn"), "filter: {rendered}");
    assert!(rendered.contains("warp=warn"), "filter: {rendered}");
}

#[test]
fn test_init_logging_twice_is_harmless() {
    init_default_logging();
    init_logging(LogSettings::from_values(Some("warn"), Some("compact"), None));
    tracing::warn!("still logging after repeated initialization");
}
