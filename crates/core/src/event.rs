//! 변경 알림 이벤트 — 정의 저장소에서 엔진으로 전달되는 메시지
//!
//! 규칙, 파이프라인, 스트림 연결이 저장소에서 바뀌면 [`ChangeEvent`]가 발행되고,
//! 엔진은 이를 받아 불변 스냅샷을 새로 만들어 교체합니다.
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 추적 정보입니다.

use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// 정의 저장소 모듈명
pub const MODULE_DEFINITION_STORE: &str = "definition-store";
/// 파이프라인 프로세서 모듈명
pub const MODULE_PIPELINE_PROCESSOR: &str = "pipeline-processor";

// --- 이벤트 타입 상수 ---

/// 규칙 변경 이벤트 타입
pub const EVENT_TYPE_RULES_CHANGED: &str = "rules_changed";
/// 파이프라인 변경 이벤트 타입
pub const EVENT_TYPE_PIPELINES_CHANGED: &str = "pipelines_changed";
/// 스트림 연결 변경 이벤트 타입
pub const EVENT_TYPE_CONNECTIONS_CHANGED: &str = "pipeline_connections_changed";
/// 규칙 메트릭 설정 변경 이벤트 타입
pub const EVENT_TYPE_RULE_METRICS_CONFIG_CHANGED: &str = "rule_metrics_config_changed";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 분산 추적 ID — 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통해 전송할 수 있습니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 규칙 변경 내용
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesChanged {
    /// 삭제된 규칙 ID
    pub deleted_ids: BTreeSet<String>,
    /// 생성 또는 수정된 규칙 ID
    pub updated_ids: BTreeSet<String>,
}

/// 파이프라인 변경 내용
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinesChanged {
    /// 삭제된 파이프라인 ID
    pub deleted_ids: BTreeSet<String>,
    /// 생성 또는 수정된 파이프라인 ID
    pub updated_ids: BTreeSet<String>,
}

/// 스트림 연결 변경 내용 (해당 스트림의 새 파이프라인 집합)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConnectionsChanged {
    pub stream_id: String,
    pub pipeline_ids: BTreeSet<String>,
}

/// 변경 종류
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Rules(RulesChanged),
    Pipelines(PipelinesChanged),
    Connections(PipelineConnectionsChanged),
    /// 규칙별 메트릭 수집 여부 변경
    RuleMetricsConfig { enabled: bool },
}

/// 정의 변경 알림 이벤트
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 변경 내용
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// 새 trace로 이벤트를 생성합니다.
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_DEFINITION_STORE),
            kind,
        }
    }

    pub fn rules_changed(
        deleted_ids: impl IntoIterator<Item = String>,
        updated_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(ChangeKind::Rules(RulesChanged {
            deleted_ids: deleted_ids.into_iter().collect(),
            updated_ids: updated_ids.into_iter().collect(),
        }))
    }

    pub fn pipelines_changed(
        deleted_ids: impl IntoIterator<Item = String>,
        updated_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(ChangeKind::Pipelines(PipelinesChanged {
            deleted_ids: deleted_ids.into_iter().collect(),
            updated_ids: updated_ids.into_iter().collect(),
        }))
    }

    pub fn connections_changed(
        stream_id: impl Into<String>,
        pipeline_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::new(ChangeKind::Connections(PipelineConnectionsChanged {
            stream_id: stream_id.into(),
            pipeline_ids: pipeline_ids.into_iter().collect(),
        }))
    }
}

impl Event for ChangeEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        match self.kind {
            ChangeKind::Rules(_) => EVENT_TYPE_RULES_CHANGED,
            ChangeKind::Pipelines(_) => EVENT_TYPE_PIPELINES_CHANGED,
            ChangeKind::Connections(_) => EVENT_TYPE_CONNECTIONS_CHANGED,
            ChangeKind::RuleMetricsConfig { .. } => EVENT_TYPE_RULE_METRICS_CONFIG_CHANGED,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.metadata, self.event_type())?;
        match &self.kind {
            ChangeKind::Rules(c) => write!(
                f,
                " deleted={} updated={}",
                c.deleted_ids.len(),
                c.updated_ids.len()
            ),
            ChangeKind::Pipelines(c) => write!(
                f,
                " deleted={} updated={}",
                c.deleted_ids.len(),
                c.updated_ids.len()
            ),
            ChangeKind::Connections(c) => write!(
                f,
                " stream={} pipelines={}",
                c.stream_id,
                c.pipeline_ids.len()
            ),
            ChangeKind::RuleMetricsConfig { enabled } => write!(f, " enabled={enabled}"),
        }
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}", duration.as_secs()),
        Err(_) => "unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_metadata_new_preserves_trace_id() {
        let meta = EventMetadata::new(MODULE_PIPELINE_PROCESSOR, "trace-123");
        assert_eq!(meta.trace_id, "trace-123");
        assert_eq!(meta.source_module, MODULE_PIPELINE_PROCESSOR);
    }

    #[test]
    fn event_metadata_with_new_trace_generates_uuid() {
        let a = EventMetadata::with_new_trace(MODULE_DEFINITION_STORE);
        let b = EventMetadata::with_new_trace(MODULE_DEFINITION_STORE);
        assert_eq!(a.trace_id.len(), 36);
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn event_type_follows_kind() {
        let ev = ChangeEvent::pipelines_changed(vec!["p1".to_owned()], Vec::new());
        assert_eq!(ev.event_type(), EVENT_TYPE_PIPELINES_CHANGED);
        let ev = ChangeEvent::connections_changed("s1", vec!["p1".to_owned(), "p2".to_owned()]);
        assert_eq!(ev.event_type(), EVENT_TYPE_CONNECTIONS_CHANGED);
        assert!(ev.to_string().contains("stream=s1"));
        assert!(ev.to_string().contains("pipelines=2"));
    }

    #[test]
    fn change_event_is_send_sync() {
        fn assert_event<T: Event>() {}
        assert_event::<ChangeEvent>();
    }
}
