//! 불변 처리 스냅샷과 갱신기
//!
//! [`ProcessorState`]는 특정 시점의 규칙, 파이프라인, 연결을 담은 불변 뷰입니다.
//! 처리 중인 메시지는 시작 시점의 스냅샷을 끝까지 사용하고, 새 스냅샷은
//! [`StateHandle::swap`]으로 원자적으로 교체됩니다.
//!
//! 깨진 정의는 스냅샷 전체를 실패시키지 않고 해당 정의만 제외합니다.
//! 규칙 제외는 그 규칙을 참조하는 파이프라인의 제외로, 파이프라인 제외는
//! 그 파이프라인을 참조하는 연결의 제외로 이어집니다.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ironpipe_core::event::{ChangeEvent, ChangeKind};
use ironpipe_core::metrics as m;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ConfigurationError;
use crate::function::FunctionRegistry;
use crate::pipeline::{Pipeline, PipelineConnections, PipelineDefinition};
use crate::rule::{Rule, RuleSet};
use crate::service::{ConnectionsService, PipelineService, RuleService};

/// 스냅샷에서 제외된 정의
#[derive(Debug, Clone)]
pub struct ExcludedDefinition {
    /// `rule`, `pipeline`, `connection`
    pub kind: &'static str,
    pub id: String,
    pub error: ConfigurationError,
}

/// 불변 처리 스냅샷
#[derive(Debug, Default)]
pub struct ProcessorState {
    pipelines: BTreeMap<String, Arc<Pipeline>>,
    connections: BTreeMap<String, BTreeSet<String>>,
    rule_count: usize,
    excluded: Vec<ExcludedDefinition>,
    rule_metrics_enabled: bool,
}

impl ProcessorState {
    /// 아무것도 연결되지 않은 스냅샷
    pub fn empty() -> Self {
        Self::default()
    }

    /// 정의 목록으로 스냅샷을 구성합니다.
    ///
    /// 형식이 잘못된 규칙은 제외합니다. 알 수 없는 함수나 잘못된 인자를 쓰는 규칙은
    /// 경고만 남기고 포함하며, 평가 시점에 에러로 기록됩니다. 포함된 규칙에는 상수 접기를 적용합니다.
    pub fn build(
        rules: Vec<Rule>,
        pipelines: Vec<PipelineDefinition>,
        connections: Vec<PipelineConnections>,
        registry: &FunctionRegistry,
        rule_metrics_enabled: bool,
    ) -> Self {
        let mut excluded = Vec::new();

        let mut rule_set = RuleSet::new();
        for rule in rules {
            if let Err(error) = rule.validate() {
                exclude(&mut excluded, "rule", rule.id.clone(), error);
                continue;
            }
            if let Err(error) = rule.check_functions(registry) {
                // 해당 규칙만 평가 시점에 실패하고, 같은 스테이지의 다른 규칙은 그대로 실행됨
                tracing::warn!(rule_id = %rule.id, error = %error, "rule will fail at evaluation");
            }
            rule_set.insert(Arc::new(rule.fold_constants(registry)));
        }

        let mut resolved = BTreeMap::new();
        for definition in &pipelines {
            match Pipeline::resolve(definition, &rule_set) {
                Ok(pipeline) => {
                    resolved.insert(definition.id.clone(), Arc::new(pipeline));
                }
                Err(error) => exclude(&mut excluded, "pipeline", definition.id.clone(), error),
            }
        }

        let mut routes = BTreeMap::new();
        for connection in connections {
            let dangling = connection
                .pipeline_ids
                .iter()
                .find(|id| !resolved.contains_key(id.as_str()));
            match dangling {
                Some(pipeline_id) => {
                    let error = ConfigurationError::DanglingPipeline {
                        stream_id: connection.stream_id.clone(),
                        pipeline_id: pipeline_id.clone(),
                    };
                    exclude(
                        &mut excluded,
                        "connection",
                        connection.stream_id.clone(),
                        error,
                    );
                }
                None => {
                    routes.insert(connection.stream_id, connection.pipeline_ids);
                }
            }
        }

        Self {
            pipelines: resolved,
            connections: routes,
            rule_count: rule_set.len(),
            excluded,
            rule_metrics_enabled,
        }
    }

    /// 스트림 집합에 연결된 파이프라인 ID의 합집합
    pub fn pipelines_for_streams<'a>(
        &self,
        stream_ids: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        stream_ids
            .into_iter()
            .filter_map(|stream| self.connections.get(stream))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn pipeline(&self, id: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    /// ID 순 파이프라인
    pub fn pipelines(&self) -> impl Iterator<Item = &Arc<Pipeline>> {
        self.pipelines.values()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// 스냅샷에 들어간 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    pub fn connections(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.connections
    }

    pub fn excluded(&self) -> &[ExcludedDefinition] {
        &self.excluded
    }

    pub fn rule_metrics_enabled(&self) -> bool {
        self.rule_metrics_enabled
    }
}

fn exclude(
    excluded: &mut Vec<ExcludedDefinition>,
    kind: &'static str,
    id: String,
    error: ConfigurationError,
) {
    tracing::warn!(kind, id = %id, error = %error, "excluding broken definition from snapshot");
    metrics::counter!(m::STATE_EXCLUDED_DEFINITIONS_TOTAL, m::LABEL_KIND => kind).increment(1);
    excluded.push(ExcludedDefinition { kind, id, error });
}

/// 현재 스냅샷에 대한 공유 핸들
#[derive(Debug)]
pub struct StateHandle {
    current: RwLock<Arc<ProcessorState>>,
}

impl StateHandle {
    pub fn new(state: ProcessorState) -> Self {
        Self {
            current: RwLock::new(Arc::new(state)),
        }
    }

    /// 현재 스냅샷. 반환된 `Arc`는 교체 이후에도 유효합니다.
    pub fn current(&self) -> Arc<ProcessorState> {
        Arc::clone(&self.current.read())
    }

    /// 새 스냅샷으로 교체하고 이전 스냅샷을 반환합니다.
    pub fn swap(&self, state: Arc<ProcessorState>) -> Arc<ProcessorState> {
        std::mem::replace(&mut *self.current.write(), state)
    }
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new(ProcessorState::empty())
    }
}

/// 변경 이벤트를 받아 스냅샷을 다시 만드는 갱신기
pub struct StateUpdater {
    rules: Arc<dyn RuleService>,
    pipelines: Arc<dyn PipelineService>,
    connections: Arc<dyn ConnectionsService>,
    registry: Arc<FunctionRegistry>,
    handle: Arc<StateHandle>,
    rule_metrics_enabled: bool,
}

impl StateUpdater {
    pub fn new(
        rules: Arc<dyn RuleService>,
        pipelines: Arc<dyn PipelineService>,
        connections: Arc<dyn ConnectionsService>,
        registry: Arc<FunctionRegistry>,
        handle: Arc<StateHandle>,
    ) -> Self {
        Self {
            rules,
            pipelines,
            connections,
            registry,
            handle,
            rule_metrics_enabled: false,
        }
    }

    pub fn with_rule_metrics(mut self, enabled: bool) -> Self {
        self.rule_metrics_enabled = enabled;
        self
    }

    pub fn handle(&self) -> &Arc<StateHandle> {
        &self.handle
    }

    /// 저장소 전체를 읽어 스냅샷을 만들고 교체합니다.
    pub fn reload(&self) -> Arc<ProcessorState> {
        let state = Arc::new(ProcessorState::build(
            self.rules.load_all(),
            self.pipelines.load_all(),
            self.connections.load_all(),
            &self.registry,
            self.rule_metrics_enabled,
        ));

        metrics::counter!(m::STATE_RELOADS_TOTAL).increment(1);
        metrics::gauge!(m::STATE_ACTIVE_PIPELINES).set(state.pipeline_count() as f64);
        tracing::info!(
            rules = state.rule_count(),
            pipelines = state.pipeline_count(),
            streams = state.connections().len(),
            excluded = state.excluded().len(),
            "processor state rebuilt"
        );

        self.handle.swap(Arc::clone(&state));
        state
    }

    /// 이벤트 루프. 채널이 닫히거나 취소되면 종료합니다.
    ///
    /// 이벤트가 오면 대기 중인 이벤트를 모두 소진한 뒤 한 번만 다시 만듭니다.
    /// 최초 스냅샷은 호출 측이 [`reload`](Self::reload)로 미리 만들어 둡니다.
    pub async fn run(mut self, mut events: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("state updater cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("change event channel closed");
                        break;
                    };
                    self.apply(&event);
                    while let Ok(event) = events.try_recv() {
                        self.apply(&event);
                    }
                    self.reload();
                }
            }
        }
    }

    fn apply(&mut self, event: &ChangeEvent) {
        tracing::debug!(event = %event, "change event received");
        if let ChangeKind::RuleMetricsConfig { enabled } = event.kind {
            self.rule_metrics_enabled = enabled;
        }
    }
}
