//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironpipe_`
//! - 모듈명: `processor_`, `state_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use ironpipe_core::metrics as m;
//!
//! metrics::counter!(m::PROCESSOR_MESSAGES_PROCESSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 규칙 ID 레이블 키 (규칙별 메트릭이 켜진 경우에만 사용)
pub const LABEL_RULE_ID: &str = "rule_id";

/// 파이프라인 ID 레이블 키
pub const LABEL_PIPELINE_ID: &str = "pipeline_id";

/// 평가 단계 레이블 키 (condition, action)
pub const LABEL_PHASE: &str = "phase";

/// 정의 종류 레이블 키 (rule, pipeline, connection)
pub const LABEL_KIND: &str = "kind";

// ─── Processor 메트릭 ─────────────────────────────────────────────

/// Processor: 처리된 메시지 수 (counter)
pub const PROCESSOR_MESSAGES_PROCESSED_TOTAL: &str = "ironpipe_processor_messages_processed_total";

/// Processor: 드롭된 메시지 수 (counter)
pub const PROCESSOR_MESSAGES_DROPPED_TOTAL: &str = "ironpipe_processor_messages_dropped_total";

/// Processor: 규칙 매칭 수 (counter)
pub const PROCESSOR_RULE_MATCHES_TOTAL: &str = "ironpipe_processor_rule_matches_total";

/// Processor: 규칙 평가 에러 수 (counter, label: phase)
pub const PROCESSOR_RULE_ERRORS_TOTAL: &str = "ironpipe_processor_rule_errors_total";

/// Processor: 실행된 스테이지 수 (counter)
pub const PROCESSOR_STAGE_EXECUTIONS_TOTAL: &str = "ironpipe_processor_stage_executions_total";

/// Processor: 실행된 파이프라인 수 (counter)
pub const PROCESSOR_PIPELINE_EXECUTIONS_TOTAL: &str =
    "ironpipe_processor_pipeline_executions_total";

/// Processor: 배치 처리 지연 시간 (histogram, 초)
pub const PROCESSOR_PROCESSING_DURATION_SECONDS: &str =
    "ironpipe_processor_processing_duration_seconds";

// ─── State 메트릭 ─────────────────────────────────────────────────

/// State: 스냅샷 재구성 수 (counter)
pub const STATE_RELOADS_TOTAL: &str = "ironpipe_state_reloads_total";

/// State: 스냅샷에서 제외된 정의 수 (counter, label: kind)
pub const STATE_EXCLUDED_DEFINITIONS_TOTAL: &str = "ironpipe_state_excluded_definitions_total";

/// State: 활성 파이프라인 수 (gauge)
pub const STATE_ACTIVE_PIPELINES: &str = "ironpipe_state_active_pipelines";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 메시지 배치 처리 시간 버킷 (초)
pub const PROCESSING_DURATION_BUCKETS: [f64; 10] = [
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 1.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더를 설치한 뒤 한 번 호출합니다. 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        PROCESSOR_MESSAGES_PROCESSED_TOTAL,
        "Total number of messages run through the pipeline processor"
    );
    describe_counter!(
        PROCESSOR_MESSAGES_DROPPED_TOTAL,
        "Total number of messages dropped by drop_message"
    );
    describe_counter!(
        PROCESSOR_RULE_MATCHES_TOTAL,
        "Total number of rules whose condition evaluated to true"
    );
    describe_counter!(
        PROCESSOR_RULE_ERRORS_TOTAL,
        "Total number of rule evaluation errors by phase (condition, action)"
    );
    describe_counter!(
        PROCESSOR_STAGE_EXECUTIONS_TOTAL,
        "Total number of pipeline stages executed"
    );
    describe_counter!(
        PROCESSOR_PIPELINE_EXECUTIONS_TOTAL,
        "Total number of pipeline runs started"
    );
    describe_histogram!(
        PROCESSOR_PROCESSING_DURATION_SECONDS,
        "Time to process a single message batch in seconds"
    );

    describe_counter!(
        STATE_RELOADS_TOTAL,
        "Total number of processor state snapshot rebuilds"
    );
    describe_counter!(
        STATE_EXCLUDED_DEFINITIONS_TOTAL,
        "Total number of broken definitions excluded from a snapshot"
    );
    describe_gauge!(
        STATE_ACTIVE_PIPELINES,
        "Number of pipelines in the active snapshot"
    );
}
