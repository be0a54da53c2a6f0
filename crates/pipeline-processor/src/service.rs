//! 정의 저장소 -- 규칙, 파이프라인, 연결
//!
//! 서비스 trait은 스냅샷 구성 시에만 사용되며 메시지 처리 경로에서는 호출되지 않습니다.
//! 인메모리 구현은 단일 writer/다중 reader 방식입니다. 쓰기는 현재 맵을 복제해 수정한 뒤
//! 통째로 교체하므로, 읽기 측은 잠금을 잠깐 잡고 `Arc`만 복제합니다.
//!
//! 변경이 일어나면 알림 채널로 [`ChangeEvent`]를 보냅니다. 채널이 가득 차면 이벤트를 버립니다.
//! 대기 중인 이벤트가 하나라도 있으면 갱신기가 전체 스냅샷을 다시 만듭니다.

use std::collections::BTreeMap;
use std::sync::Arc;

use ironpipe_core::event::ChangeEvent;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::ServiceError;
use crate::pipeline::{PipelineConnections, PipelineDefinition};
use crate::rule::Rule;

/// 규칙 저장소
pub trait RuleService: Send + Sync {
    /// 규칙을 저장합니다. ID가 비어 있으면 새로 발급하며, 저장된 규칙을 반환합니다.
    ///
    /// # Errors
    /// - 다른 규칙이 같은 제목을 사용 중 (`DuplicateTitle`)
    /// - 형식 오류 (`Invalid`)
    fn save(&self, rule: Rule) -> Result<Rule, ServiceError>;

    fn load(&self, id: &str) -> Result<Rule, ServiceError>;

    /// ID 순으로 모든 규칙을 반환합니다.
    fn load_all(&self) -> Vec<Rule>;

    fn delete(&self, id: &str) -> Result<(), ServiceError>;
}

/// 파이프라인 저장소
pub trait PipelineService: Send + Sync {
    fn save(&self, pipeline: PipelineDefinition) -> Result<PipelineDefinition, ServiceError>;

    fn load(&self, id: &str) -> Result<PipelineDefinition, ServiceError>;

    fn load_all(&self) -> Vec<PipelineDefinition>;

    fn delete(&self, id: &str) -> Result<(), ServiceError>;
}

/// 스트림 연결 저장소
///
/// 스트림 ID로 upsert합니다. 저장하면 기존 집합을 병합하지 않고 대체합니다.
pub trait ConnectionsService: Send + Sync {
    fn save(&self, connections: PipelineConnections) -> Result<PipelineConnections, ServiceError>;

    fn load(&self, stream_id: &str) -> Result<PipelineConnections, ServiceError>;

    fn load_all(&self) -> Vec<PipelineConnections>;

    fn delete(&self, stream_id: &str) -> Result<(), ServiceError>;
}

/// 복제 후 교체 방식의 키-값 저장소
#[derive(Debug)]
struct SnapshotStore<T> {
    entries: RwLock<Arc<BTreeMap<String, T>>>,
}

impl<T: Clone> SnapshotStore<T> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(BTreeMap::new())),
        }
    }

    fn snapshot(&self) -> Arc<BTreeMap<String, T>> {
        Arc::clone(&self.entries.read())
    }

    fn get(&self, key: &str) -> Option<T> {
        self.snapshot().get(key).cloned()
    }

    fn values(&self) -> Vec<T> {
        self.snapshot().values().cloned().collect()
    }

    /// 쓰기 잠금 안에서 복제본을 수정하고, 성공하면 교체합니다.
    fn update<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, T>) -> Result<R, ServiceError>,
    ) -> Result<R, ServiceError> {
        let mut guard = self.entries.write();
        let mut next = BTreeMap::clone(&guard);
        let result = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(result)
    }
}

/// 알림 채널 송신측 (없으면 알림 없음)
#[derive(Debug, Clone, Default)]
struct Notifier {
    sender: Option<mpsc::Sender<ChangeEvent>>,
}

impl Notifier {
    fn publish(&self, event: ChangeEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(event = %event, "change channel full, pending rebuild covers it");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(event = %event, "change channel closed, event not delivered");
            }
        }
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 인메모리 규칙 저장소
#[derive(Debug)]
pub struct InMemoryRuleService {
    store: SnapshotStore<Rule>,
    notifier: Notifier,
}

impl InMemoryRuleService {
    pub fn new() -> Self {
        Self {
            store: SnapshotStore::new(),
            notifier: Notifier::default(),
        }
    }

    /// 변경 이벤트를 보낼 채널을 설정합니다.
    pub fn with_notifier(mut self, sender: mpsc::Sender<ChangeEvent>) -> Self {
        self.notifier = Notifier {
            sender: Some(sender),
        };
        self
    }
}

impl Default for InMemoryRuleService {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleService for InMemoryRuleService {
    fn save(&self, mut rule: Rule) -> Result<Rule, ServiceError> {
        if rule.id.is_empty() {
            rule.id = generate_id();
        }
        rule.validate().map_err(|e| ServiceError::Invalid {
            kind: "rule",
            reason: e.to_string(),
        })?;

        let saved = self.store.update(|rules| {
            let conflict = rules
                .values()
                .find(|existing| existing.title == rule.title && existing.id != rule.id);
            if let Some(existing) = conflict {
                return Err(ServiceError::DuplicateTitle {
                    title: rule.title.clone(),
                    existing_id: existing.id.clone(),
                });
            }
            rules.insert(rule.id.clone(), rule.clone());
            Ok(rule)
        })?;

        tracing::debug!(rule_id = %saved.id, title = %saved.title, "rule saved");
        self.notifier
            .publish(ChangeEvent::rules_changed([], [saved.id.clone()]));
        Ok(saved)
    }

    fn load(&self, id: &str) -> Result<Rule, ServiceError> {
        self.store.get(id).ok_or_else(|| ServiceError::NotFound {
            kind: "rule",
            id: id.to_owned(),
        })
    }

    fn load_all(&self) -> Vec<Rule> {
        self.store.values()
    }

    fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.store.update(|rules| {
            rules
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound {
                    kind: "rule",
                    id: id.to_owned(),
                })
        })?;
        tracing::debug!(rule_id = %id, "rule deleted");
        self.notifier
            .publish(ChangeEvent::rules_changed([id.to_owned()], []));
        Ok(())
    }
}

/// 인메모리 파이프라인 저장소
#[derive(Debug)]
pub struct InMemoryPipelineService {
    store: SnapshotStore<PipelineDefinition>,
    notifier: Notifier,
}

impl InMemoryPipelineService {
    pub fn new() -> Self {
        Self {
            store: SnapshotStore::new(),
            notifier: Notifier::default(),
        }
    }

    pub fn with_notifier(mut self, sender: mpsc::Sender<ChangeEvent>) -> Self {
        self.notifier = Notifier {
            sender: Some(sender),
        };
        self
    }
}

impl Default for InMemoryPipelineService {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineService for InMemoryPipelineService {
    fn save(&self, mut pipeline: PipelineDefinition) -> Result<PipelineDefinition, ServiceError> {
        if pipeline.id.is_empty() {
            pipeline.id = generate_id();
        }
        pipeline.validate()?;

        let saved = self.store.update(|pipelines| {
            pipelines.insert(pipeline.id.clone(), pipeline.clone());
            Ok(pipeline)
        })?;

        tracing::debug!(pipeline_id = %saved.id, "pipeline saved");
        self.notifier
            .publish(ChangeEvent::pipelines_changed([], [saved.id.clone()]));
        Ok(saved)
    }

    fn load(&self, id: &str) -> Result<PipelineDefinition, ServiceError> {
        self.store.get(id).ok_or_else(|| ServiceError::NotFound {
            kind: "pipeline",
            id: id.to_owned(),
        })
    }

    fn load_all(&self) -> Vec<PipelineDefinition> {
        self.store.values()
    }

    fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.store.update(|pipelines| {
            pipelines
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound {
                    kind: "pipeline",
                    id: id.to_owned(),
                })
        })?;
        tracing::debug!(pipeline_id = %id, "pipeline deleted");
        self.notifier
            .publish(ChangeEvent::pipelines_changed([id.to_owned()], []));
        Ok(())
    }
}

/// 인메모리 연결 저장소
#[derive(Debug)]
pub struct InMemoryConnectionsService {
    store: SnapshotStore<PipelineConnections>,
    notifier: Notifier,
}

impl InMemoryConnectionsService {
    pub fn new() -> Self {
        Self {
            store: SnapshotStore::new(),
            notifier: Notifier::default(),
        }
    }

    pub fn with_notifier(mut self, sender: mpsc::Sender<ChangeEvent>) -> Self {
        self.notifier = Notifier {
            sender: Some(sender),
        };
        self
    }
}

impl Default for InMemoryConnectionsService {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionsService for InMemoryConnectionsService {
    fn save(&self, connections: PipelineConnections) -> Result<PipelineConnections, ServiceError> {
        connections.validate()?;

        let saved = self.store.update(|all| {
            all.insert(connections.stream_id.clone(), connections.clone());
            Ok(connections)
        })?;

        tracing::debug!(
            stream_id = %saved.stream_id,
            pipelines = saved.pipeline_ids.len(),
            "pipeline connections saved"
        );
        self.notifier.publish(ChangeEvent::connections_changed(
            saved.stream_id.clone(),
            saved.pipeline_ids.iter().cloned(),
        ));
        Ok(saved)
    }

    fn load(&self, stream_id: &str) -> Result<PipelineConnections, ServiceError> {
        self.store
            .get(stream_id)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "connections",
                id: stream_id.to_owned(),
            })
    }

    fn load_all(&self) -> Vec<PipelineConnections> {
        self.store.values()
    }

    fn delete(&self, stream_id: &str) -> Result<(), ServiceError> {
        self.store.update(|all| {
            all.remove(stream_id)
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound {
                    kind: "connections",
                    id: stream_id.to_owned(),
                })
        })?;
        self.notifier
            .publish(ChangeEvent::connections_changed(stream_id, []));
        Ok(())
    }
}
