//! 설정 관리 — ironpipe.toml 파싱 및 런타임 설정
//!
//! [`IronpipeConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONPIPE_PROCESSOR_WORKER_COUNT=8` 형식)
//! 3. 설정 파일 (`ironpipe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironpipe_core::error::IronpipeError> {
//! use ironpipe_core::config::IronpipeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronpipeConfig::load("ironpipe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronpipeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronpipeError};

/// Ironpipe 통합 설정
///
/// `ironpipe.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronpipeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파이프라인 프로세서 설정
    #[serde(default)]
    pub processor: PipelineProcessorConfig,
}

impl IronpipeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronpipeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronpipeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronpipeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronpipeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronpipeError> {
        toml::from_str(toml_str).map_err(|e| {
            IronpipeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONPIPE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONPIPE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONPIPE_GENERAL_LOG_FORMAT");

        // Processor
        override_bool(&mut self.processor.enabled, "IRONPIPE_PROCESSOR_ENABLED");
        override_string(
            &mut self.processor.rules_dir,
            "IRONPIPE_PROCESSOR_RULES_DIR",
        );
        override_string(
            &mut self.processor.pipelines_dir,
            "IRONPIPE_PROCESSOR_PIPELINES_DIR",
        );
        override_string(
            &mut self.processor.connections_file,
            "IRONPIPE_PROCESSOR_CONNECTIONS_FILE",
        );
        override_usize(
            &mut self.processor.worker_count,
            "IRONPIPE_PROCESSOR_WORKER_COUNT",
        );
        override_usize(
            &mut self.processor.channel_capacity,
            "IRONPIPE_PROCESSOR_CHANNEL_CAPACITY",
        );
        override_bool(
            &mut self.processor.rule_metrics_enabled,
            "IRONPIPE_PROCESSOR_RULE_METRICS_ENABLED",
        );
        override_u32(
            &mut self.processor.max_stream_rounds,
            "IRONPIPE_PROCESSOR_MAX_STREAM_ROUNDS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronpipeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.processor.enabled {
            if self.processor.worker_count == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "processor.worker_count".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }

            if self.processor.channel_capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "processor.channel_capacity".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }

            if self.processor.max_stream_rounds == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "processor.max_stream_rounds".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 파이프라인 프로세서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineProcessorConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 규칙 YAML 디렉토리
    pub rules_dir: String,
    /// 파이프라인 YAML 디렉토리
    pub pipelines_dir: String,
    /// 스트림 연결 YAML 파일
    pub connections_file: String,
    /// 워커 태스크 수
    pub worker_count: usize,
    /// 입력 채널 용량 (배치 단위)
    pub channel_capacity: usize,
    /// 규칙별 메트릭 수집 여부
    pub rule_metrics_enabled: bool,
    /// 스트림 재라우팅 최대 라운드 수
    pub max_stream_rounds: u32,
}

impl Default for PipelineProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules_dir: "/etc/ironpipe/rules".to_owned(),
            pipelines_dir: "/etc/ironpipe/pipelines".to_owned(),
            connections_file: "/etc/ironpipe/connections.yml".to_owned(),
            worker_count: 4,
            channel_capacity: 1024,
            rule_metrics_enabled: false,
            max_stream_rounds: 16,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = IronpipeConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert!(config.processor.enabled);
        assert_eq!(config.processor.worker_count, 4);
        assert!(!config.processor.rule_metrics_enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        IronpipeConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = IronpipeConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.processor.max_stream_rounds, 16);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[processor]
worker_count = 2
rules_dir = "/srv/rules"
"#;
        let config = IronpipeConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.processor.worker_count, 2);
        assert_eq!(config.processor.rules_dir, "/srv/rules");
        assert_eq!(config.processor.channel_capacity, 1024);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = IronpipeConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            IronpipeError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = IronpipeConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let mut config = IronpipeConfig::default();
        config.general.log_format = "xml".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn validate_rejects_zero_workers_when_enabled() {
        let mut config = IronpipeConfig::default();
        config.processor.worker_count = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_count"));
    }

    #[test]
    fn validate_skips_processor_checks_when_disabled() {
        let mut config = IronpipeConfig::default();
        config.processor.enabled = false;
        config.processor.worker_count = 0;
        config.processor.max_stream_rounds = 0;
        config.validate().unwrap();
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트 전용 고유 키를 사용하며 다른 스레드가 이 키를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_IRONPIPE_STR", "overridden") };
        override_string(&mut val, "TEST_IRONPIPE_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_IRONPIPE_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트 전용 고유 키를 사용하며 다른 스레드가 이 키를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_IRONPIPE_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_IRONPIPE_BOOL_BAD");
        assert!(!val);
        unsafe { std::env::remove_var("TEST_IRONPIPE_BOOL_BAD") };
    }

    #[test]
    fn env_override_u32_valid() {
        let mut val = 16_u32;
        // SAFETY: 테스트 전용 고유 키를 사용하며 다른 스레드가 이 키를 읽지 않습니다.
        unsafe { std::env::set_var("TEST_IRONPIPE_U32", "3") };
        override_u32(&mut val, "TEST_IRONPIPE_U32");
        assert_eq!(val, 3);
        unsafe { std::env::remove_var("TEST_IRONPIPE_U32") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 7_usize;
        override_usize(&mut val, "TEST_IRONPIPE_NONEXISTENT_12345");
        assert_eq!(val, 7);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = IronpipeConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = IronpipeConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.processor.rules_dir, parsed.processor.rules_dir);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = IronpipeConfig::from_file("/nonexistent/path/ironpipe.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IronpipeError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
