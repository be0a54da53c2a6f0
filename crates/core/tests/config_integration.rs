//! ironpipe.toml 통합 설정 테스트
//!
//! - ironpipe.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use ironpipe_core::config::IronpipeConfig;
use ironpipe_core::error::{ConfigError, IronpipeError};

const EXAMPLE: &str = include_str!("../../../ironpipe.toml.example");

// =============================================================================
// ironpipe.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let config = IronpipeConfig::parse(EXAMPLE).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
}

#[test]
fn example_config_matches_code_defaults() {
    let example = IronpipeConfig::parse(EXAMPLE).expect("should parse");
    let defaults = IronpipeConfig::default();

    assert_eq!(example.processor.enabled, defaults.processor.enabled);
    assert_eq!(example.processor.rules_dir, defaults.processor.rules_dir);
    assert_eq!(
        example.processor.pipelines_dir,
        defaults.processor.pipelines_dir
    );
    assert_eq!(
        example.processor.connections_file,
        defaults.processor.connections_file
    );
    assert_eq!(
        example.processor.worker_count,
        defaults.processor.worker_count
    );
    assert_eq!(
        example.processor.channel_capacity,
        defaults.processor.channel_capacity
    );
    assert_eq!(
        example.processor.rule_metrics_enabled,
        defaults.processor.rule_metrics_enabled
    );
    assert_eq!(
        example.processor.max_stream_rounds,
        defaults.processor.max_stream_rounds
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_general_only() {
    let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
"#;
    let config = IronpipeConfig::parse(toml).expect("should parse");
    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.processor.worker_count, 4);
}

#[test]
fn partial_config_processor_only() {
    let toml = r#"
[processor]
rule_metrics_enabled = true
max_stream_rounds = 4
"#;
    let config = IronpipeConfig::parse(toml).expect("should parse");
    assert!(config.processor.rule_metrics_enabled);
    assert_eq!(config.processor.max_stream_rounds, 4);
    assert_eq!(config.general.log_level, "info");
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

fn with_env<T>(key: &str, value: &str, f: impl FnOnce() -> T) -> T {
    let original = std::env::var(key).ok();
    // SAFETY: serial_test로 직렬화되어 다른 테스트가 동시에 환경변수를 읽지 않습니다.
    unsafe {
        std::env::set_var(key, value);
    }
    let result = f();
    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var(key, val),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;
    let level = with_env("IRONPIPE_GENERAL_LOG_LEVEL", "error", || {
        let mut config = IronpipeConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.general.log_level
    });
    assert_eq!(level, "error");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let workers = with_env("IRONPIPE_PROCESSOR_WORKER_COUNT", "12", || {
        let mut config = IronpipeConfig::default();
        config.apply_env_overrides();
        config.processor.worker_count
    });
    assert_eq!(workers, 12);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let enabled = with_env("IRONPIPE_PROCESSOR_RULE_METRICS_ENABLED", "true", || {
        let mut config = IronpipeConfig::default();
        config.apply_env_overrides();
        config.processor.rule_metrics_enabled
    });
    assert!(enabled);
}

#[test]
#[serial_test::serial]
fn env_override_unparseable_value_keeps_toml_value() {
    let toml = r#"
[processor]
max_stream_rounds = 5
"#;
    let rounds = with_env("IRONPIPE_PROCESSOR_MAX_STREAM_ROUNDS", "many", || {
        let mut config = IronpipeConfig::parse(toml).expect("should parse");
        config.apply_env_overrides();
        config.processor.max_stream_rounds
    });
    assert_eq!(rounds, 5);
}

// =============================================================================
// 에러 케이스
// =============================================================================

#[test]
fn comments_only_parses_with_defaults() {
    let config = IronpipeConfig::parse("# nothing here\n# at all\n").expect("should parse");
    assert_eq!(config.processor.channel_capacity, 1024);
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[processor]
worker_count = "four"
"#;
    let err = IronpipeConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        IronpipeError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn unknown_section_is_ignored() {
    let toml = r#"
[general]
log_level = "debug"

[future_module]
flag = true
"#;
    let config = IronpipeConfig::parse(toml).expect("unknown sections should be ignored");
    assert_eq!(config.general.log_level, "debug");
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = IronpipeConfig::from_file("/tmp/ironpipe_test_nonexistent_12345.toml").await;
    assert!(matches!(
        result.unwrap_err(),
        IronpipeError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_from_disk_applies_validation() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("ironpipe.toml");
    std::fs::write(&path, "[processor]\nchannel_capacity = 0\n").expect("should write");

    let err = IronpipeConfig::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("channel_capacity"));
}

#[test]
fn serialize_and_reparse_roundtrip() {
    let original = IronpipeConfig::parse(EXAMPLE).expect("should parse");
    let toml_str = toml::to_string_pretty(&original).expect("should serialize");
    let reparsed = IronpipeConfig::parse(&toml_str).expect("should reparse");
    assert_eq!(original.processor.rules_dir, reparsed.processor.rules_dir);
    assert_eq!(
        original.processor.max_stream_rounds,
        reparsed.processor.max_stream_rounds
    );
}
