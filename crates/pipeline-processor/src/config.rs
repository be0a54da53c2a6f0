//! 파이프라인 프로세서 설정
//!
//! [`ProcessorConfig`]는 core의
//! [`PipelineProcessorConfig`](ironpipe_core::config::PipelineProcessorConfig)에서 파생됩니다.
//!
//! # 사용 예시
//! ```ignore
//! use ironpipe_core::config::IronpipeConfig;
//! use ironpipe_pipeline_processor::config::ProcessorConfig;
//!
//! let core_config = IronpipeConfig::default();
//! let config = ProcessorConfig::from_core(&core_config.processor);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ProcessorError;

const MAX_WORKER_COUNT: usize = 256;
const MAX_CHANNEL_CAPACITY: usize = 1_000_000;
const MAX_STREAM_ROUNDS: u32 = 1_000;

/// 파이프라인 프로세서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
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
    /// 입력/출력 채널 용량 (배치 단위)
    pub channel_capacity: usize,
    /// 규칙별 메트릭 수집 여부
    pub rule_metrics_enabled: bool,
    /// 메시지 하나당 스트림 재라우팅 최대 라운드 수
    pub max_stream_rounds: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_core(&ironpipe_core::config::PipelineProcessorConfig::default())
    }
}

impl ProcessorConfig {
    /// core 설정에서 프로세서 설정을 생성합니다.
    pub fn from_core(core: &ironpipe_core::config::PipelineProcessorConfig) -> Self {
        Self {
            enabled: core.enabled,
            rules_dir: core.rules_dir.clone(),
            pipelines_dir: core.pipelines_dir.clone(),
            connections_file: core.connections_file.clone(),
            worker_count: core.worker_count,
            channel_capacity: core.channel_capacity,
            rule_metrics_enabled: core.rule_metrics_enabled,
            max_stream_rounds: core.max_stream_rounds,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ProcessorError> {
        if self.worker_count == 0 || self.worker_count > MAX_WORKER_COUNT {
            return Err(ProcessorError::Config {
                field: "worker_count".to_owned(),
                reason: format!("must be 1-{MAX_WORKER_COUNT}"),
            });
        }

        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(ProcessorError::Config {
                field: "channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            });
        }

        if self.max_stream_rounds == 0 || self.max_stream_rounds > MAX_STREAM_ROUNDS {
            return Err(ProcessorError::Config {
                field: "max_stream_rounds".to_owned(),
                reason: format!("must be 1-{MAX_STREAM_ROUNDS}"),
            });
        }

        if self.enabled {
            for (field, value) in [
                ("rules_dir", &self.rules_dir),
                ("pipelines_dir", &self.pipelines_dir),
                ("connections_file", &self.connections_file),
            ] {
                if value.is_empty() {
                    return Err(ProcessorError::Config {
                        field: field.to_owned(),
                        reason: "must not be empty when enabled".to_owned(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// 프로세서 설정 빌더
#[derive(Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// 규칙 디렉토리를 설정합니다.
    pub fn rules_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.rules_dir = dir.into();
        self
    }

    /// 파이프라인 디렉토리를 설정합니다.
    pub fn pipelines_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.pipelines_dir = dir.into();
        self
    }

    /// 스트림 연결 파일을 설정합니다.
    pub fn connections_file(mut self, path: impl Into<String>) -> Self {
        self.config.connections_file = path.into();
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn rule_metrics_enabled(mut self, enabled: bool) -> Self {
        self.config.rule_metrics_enabled = enabled;
        self
    }

    pub fn max_stream_rounds(mut self, rounds: u32) -> Self {
        self.config.max_stream_rounds = rounds;
        self
    }

    /// 설정을 검증하고 `ProcessorConfig`를 생성합니다.
    pub fn build(self) -> Result<ProcessorConfig, ProcessorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
