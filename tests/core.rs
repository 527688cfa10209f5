//! Core infrastructure tests.

mod common;

use common::{create_minimal_config, write_config};
use kitmax::core::config::{Config, ConfigOverrides};
use kitmax::core::error::KitmaxError;
use kitmax::pipeline::ReconcileMode;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config() {
    let file = create_minimal_config();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.redis.host, "127.0.0.1");
    assert_eq!(config.redis.port, 6379);
    assert_eq!(config.pipeline.reconcile_mode, ReconcileMode::Atomic);
    assert_eq!(config.subscriber.reconnect_backoff_ms, 500);
}

#[test]
fn parse_full_config() {
    let file = write_config(
        r#"
[redis]
host = "redis.internal"
port = 6380
db = 2
username = "kitmax"
password = "secret"
connect_timeout_ms = 500
command_timeout_ms = 250
pool_size = 4
notify_keyspace_events = "KA"

[pipeline]
record_pattern = "detile:*"
reconcile_mode = "read-then-write"
max_in_flight = 16
ignore_removals = false

[subscriber]
reconnect_backoff_ms = 50
reconnect_backoff_max_ms = 2000

[telemetry]
log_level = "debug"
stats_interval_seconds = 0
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.redis.address(), "redis.internal:6380");
    assert_eq!(config.redis.db, 2);
    assert_eq!(config.redis.password.as_deref(), Some("secret"));
    assert_eq!(config.redis.command_timeout().as_millis(), 250);
    assert_eq!(config.redis.notify_keyspace_events.as_deref(), Some("KA"));
    assert_eq!(config.pipeline.record_pattern, "detile:*");
    assert_eq!(config.pipeline.reconcile_mode, ReconcileMode::ReadThenWrite);
    assert_eq!(config.pipeline.max_in_flight, 16);
    assert!(!config.pipeline.ignore_removals);
    assert_eq!(config.subscriber.reconnect_backoff_max_ms, 2000);
    assert_eq!(config.telemetry.stats_interval_seconds, 0);
}

#[test]
fn missing_redis_section_is_rejected() {
    let file = write_config(
        r#"
[pipeline]
record_pattern = "tile:*"
"#,
    );
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn validate_zero_pool_size() {
    let file = write_config(
        r#"
[redis]
host = "127.0.0.1"
pool_size = 0
"#,
    );

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("pool_size"));
}

#[test]
fn validate_zero_max_in_flight() {
    let file = write_config(
        r#"
[redis]
host = "127.0.0.1"

[pipeline]
max_in_flight = 0
"#,
    );

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("max_in_flight"));
}

#[test]
fn missing_file_reports_path() {
    let err = Config::from_file(std::path::Path::new("/nonexistent/kitmax.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/kitmax.toml"));
}

#[test]
fn overrides_replace_file_values() {
    let file = create_minimal_config();
    let mut config = Config::from_file(file.path()).unwrap();

    config.apply_overrides(&ConfigOverrides {
        log_level: Some("trace".to_string()),
        redis_host: Some("10.0.0.5".to_string()),
        redis_port: Some(7000),
    });

    assert_eq!(config.telemetry.log_level, "trace");
    assert_eq!(config.redis.address(), "10.0.0.5:7000");
    assert!(config.validate().is_ok());
}

#[test]
fn invalid_override_fails_validation() {
    let file = create_minimal_config();
    let mut config = Config::from_file(file.path()).unwrap();

    config.apply_overrides(&ConfigOverrides {
        log_level: Some("chatty".to_string()),
        ..Default::default()
    });

    assert!(config.validate().is_err());
}

// ============================================================================
// Error tests
// ============================================================================

#[test]
fn error_classification() {
    let missing = KitmaxError::missing_field("tile:1", "kit");
    assert!(missing.is_extraction_failure());
    assert!(!missing.is_retriable());

    let parse = KitmaxError::parse("tile:1", "state", "abc", "invalid digit");
    assert!(parse.is_extraction_failure());
    assert!(!parse.is_retriable());

    let unavailable = KitmaxError::unavailable("connection refused");
    assert!(!unavailable.is_extraction_failure());
    assert!(unavailable.is_retriable());
}

#[test]
fn error_messages_name_key_and_field() {
    let err = KitmaxError::parse("tile:1", "state", "abc", "invalid digit");
    let message = err.to_string();
    assert!(message.contains("tile:1"));
    assert!(message.contains("state"));
    assert!(message.contains("abc"));

    let err = KitmaxError::missing_field("tile:2", "updatedAt");
    assert!(err.to_string().contains("updatedAt"));
}
