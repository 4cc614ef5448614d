use keel_config::{LogFormat, LogLevel, LoggingConfig};
use keel_logging::{build_env_filter, init_logging_from_config, init_simple_tracing};

#[test]
fn test_env_filter_includes_extra_directives() {
    let config = LoggingConfig {
        level: LogLevel::Debug,
        filter: Some("sqlx=warn".to_string()),
        ..LoggingConfig::default()
    };
    let filter = build_env_filter(&config).to_string();
    assert!(filter.contains("debug"));
    assert!(filter.contains("sqlx=warn"));
}

#[test]
fn test_repeated_initialisation_is_harmless() {
    let config = LoggingConfig {
        format: LogFormat::Json,
        ..LoggingConfig::default()
    };
    assert!(init_logging_from_config(&config).is_ok());
    assert!(init_logging_from_config(&LoggingConfig::default()).is_ok());
    assert!(init_simple_tracing("warn").is_ok());
}
