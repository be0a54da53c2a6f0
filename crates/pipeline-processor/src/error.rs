//! 파이프라인 프로세서 에러 타입
//!
//! 세 계층으로 나뉩니다.
//!
//! - [`EvalError`]: 메시지 하나를 평가하는 중 발생하는 예상된 실패. 규칙 경계에서
//!   잡혀 메시지에 기록되며 스테이지나 배치를 중단시키지 않습니다.
//! - [`ConfigurationError`]: 스냅샷 구성 시 발견되는 정의 오류. 해당 파이프라인/연결만
//!   스냅샷에서 제외됩니다.
//! - [`ProcessorError`]: 로딩, 저장소, 채널 등 처리 경로 밖의 에러.
//!   `From<ProcessorError> for IronpipeError` 변환이 구현되어 있습니다.

use ironpipe_core::error::{IronpipeError, PipelineError};
use ironpipe_core::types::ValueType;

/// 표현식/함수 평가 에러
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// 연산에 맞지 않는 타입
    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// 실패한 연산 (예: "comparison lt", "argument 'value' of lowercase")
        context: String,
        /// 기대한 타입
        expected: String,
        /// 실제 런타임 타입
        actual: ValueType,
    },

    /// 인덱스 접근을 지원하지 않는 값
    #[error("cannot index into value of type {actual}")]
    InvalidIndexTarget {
        /// 실제 런타임 타입
        actual: ValueType,
    },

    /// 범위를 벗어난 인덱스
    #[error("index {index} out of bounds for {target} of length {len}")]
    IndexOutOfBounds {
        target: ValueType,
        index: i64,
        len: usize,
    },

    /// 필수 인자 누락 (또는 null)
    #[error("missing required argument '{parameter}' in call to {function}")]
    MissingRequiredArgument { function: String, parameter: String },

    /// 선언되지 않은 인자 이름
    #[error("unexpected argument '{parameter}' in call to {function}")]
    UnexpectedArgument { function: String, parameter: String },

    /// 레지스트리에 없는 함수
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// 함수 본문 실행 실패
    #[error("function {function} failed: {cause}")]
    FunctionRuntime { function: String, cause: String },

    /// 정수 오버플로우, 0으로 나누기 등
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
}

impl EvalError {
    /// 타입 불일치 에러를 만듭니다.
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: ValueType,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual,
        }
    }

    /// 함수 실행 실패 에러를 만듭니다.
    pub fn function(function: impl Into<String>, cause: impl ToString) -> Self {
        Self::FunctionRuntime {
            function: function.into(),
            cause: cause.to_string(),
        }
    }
}

/// 스냅샷 구성 시 발견되는 정의 오류
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// 같은 번호의 스테이지가 둘 이상
    #[error("pipeline '{pipeline_id}' declares stage {stage} more than once")]
    DuplicateStage { pipeline_id: String, stage: i32 },

    /// 스테이지가 존재하지 않는 규칙을 참조
    #[error("pipeline '{pipeline_id}' stage {stage} references unknown rule '{rule}'")]
    DanglingRule {
        pipeline_id: String,
        stage: i32,
        rule: String,
    },

    /// 연결이 존재하지 않는(또는 제외된) 파이프라인을 참조
    #[error("connection for stream '{stream_id}' references unknown pipeline '{pipeline_id}'")]
    DanglingPipeline {
        stream_id: String,
        pipeline_id: String,
    },

    /// 스테이지가 없는 파이프라인
    #[error("pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    /// 규칙이 없는 스테이지
    #[error("pipeline '{pipeline_id}' stage {stage} has no rules")]
    EmptyStage { pipeline_id: String, stage: i32 },

    /// 규칙 자체가 유효하지 않음
    #[error("rule '{rule_id}' is invalid: {reason}")]
    InvalidRule { rule_id: String, reason: String },
}

/// 정의 저장소 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// 해당 ID가 없음
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// 다른 규칙이 이미 같은 제목을 사용
    #[error("rule title '{title}' is already used by rule '{existing_id}'")]
    DuplicateTitle { title: String, existing_id: String },

    /// 저장 전 검증 실패
    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

/// 파이프라인 프로세서 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// 정의 파일 로딩 실패
    #[error("definition load error: {path}: {reason}")]
    DefinitionLoad {
        /// 파일 또는 디렉토리 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 정의 구성 에러
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// 저장소 에러
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// 함수 레지스트리 구성 실패
    #[error("function registry error: {0}")]
    Registry(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 이미 실행 중
    #[error("processor already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("processor not running")]
    NotRunning,

    /// 정지된 프로세서는 다시 시작할 수 없음
    #[error("processor cannot be restarted after stop")]
    CannotRestart,

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessorError> for IronpipeError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::Io(e) => IronpipeError::Io(e),
            ProcessorError::Channel(msg) => {
                IronpipeError::Pipeline(PipelineError::ChannelSend(msg))
            }
            ProcessorError::Configuration(_)
            | ProcessorError::Service(_)
            | ProcessorError::DefinitionLoad { .. } => {
                IronpipeError::Pipeline(PipelineError::Definition(err.to_string()))
            }
            ProcessorError::AlreadyRunning => {
                IronpipeError::Pipeline(PipelineError::AlreadyRunning)
            }
            ProcessorError::NotRunning => IronpipeError::Pipeline(PipelineError::NotRunning),
            ProcessorError::Registry(_)
            | ProcessorError::Config { .. }
            | ProcessorError::CannotRestart => {
                IronpipeError::Pipeline(PipelineError::InitFailed(err.to_string()))
            }
        }
    }
}
