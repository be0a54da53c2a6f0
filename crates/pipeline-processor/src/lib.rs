#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`ast`]: 표현식/문장 AST, 평가기, 상수 접기
//! - [`function`]: 함수 서술자, 인자 바인딩, 레지스트리, 내장 함수
//! - [`context`]: 규칙 평가마다 새로 만드는 평가 컨텍스트
//! - [`rule`]: WHEN/THEN 규칙
//! - [`pipeline`]: 스테이지, 파이프라인, 스트림 연결
//! - [`service`]: 규칙/파이프라인/연결 저장소 trait과 인메모리 구현
//! - [`state`]: 불변 처리 스냅샷과 변경 이벤트 기반 갱신기
//! - [`interpreter`]: `MessageProcessor` 구현
//! - [`worker`]: 메시지 배치 워커 풀
//! - [`loader`]: YAML 정의 파일 로더
//! - [`processor`]: 전체 흐름 오케스트레이션
//! - [`config`]: 프로세서 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! streams -> connections -> pipelines (id 순) -> stages (번호 순) -> rules (선언 순)
//!                                                     |
//!                                             match policy: all / either / pass
//! ```

pub mod ast;
pub mod config;
pub mod context;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod loader;
pub mod pipeline;
pub mod processor;
pub mod rule;
pub mod service;
pub mod state;
pub mod worker;

// --- 주요 타입 re-export ---

// 오케스트레이션
pub use processor::{PipelineProcessor, PipelineProcessorBuilder};

// 설정
pub use config::{ProcessorConfig, ProcessorConfigBuilder};

// 에러
pub use error::{ConfigurationError, EvalError, ProcessorError, ServiceError};

// AST
pub use ast::{ArithOp, CompareOp, Expression, FunctionCall, Statement};

// 함수
pub use context::EvaluationContext;
pub use function::{
    Function, FunctionArgs, FunctionDescriptor, FunctionRegistry, ParameterDescriptor,
};

// 정의
pub use pipeline::{
    DEFAULT_STREAM_ID, MatchPolicy, Pipeline, PipelineConnections, PipelineDefinition, Stage,
    StageDefinition,
};
pub use rule::{Rule, RuleSet};

// 저장소
pub use service::{
    ConnectionsService, InMemoryConnectionsService, InMemoryPipelineService, InMemoryRuleService,
    PipelineService, RuleService,
};

// 실행
pub use interpreter::{MessageProcessor, PipelineInterpreter};
pub use loader::{Definition, DefinitionLoader};
pub use state::{ExcludedDefinition, ProcessorState, StateHandle, StateUpdater};
pub use worker::{ProcessorWorkers, WorkerChannels};
