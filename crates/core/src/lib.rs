#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod metrics;
pub mod period;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, IronpipeError, PipelineError, ValueError};

// 설정
pub use config::IronpipeConfig;

// 이벤트
pub use event::{ChangeEvent, ChangeKind, Event, EventMetadata};

// 도메인 타입
pub use message::{Message, ProcessingError, ProcessingErrorCause};
pub use period::Period;
pub use types::{ObjectValue, Value, ValueType};
