//! 프로세서 오케스트레이션 -- 정의 로딩, 스냅샷 갱신, 워커 풀의 전체 흐름을 관리합니다.
//!
//! # 내부 아키텍처
//! ```text
//! YAML files -> DefinitionLoader -> Services --ChangeEvent--> StateUpdater -> StateHandle
//!                                                                                  |
//! input mpsc -> ProcessorWorkers -> PipelineInterpreter (current snapshot) -> output mpsc
//! ```

use std::sync::Arc;

use ironpipe_core::event::ChangeEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::function::FunctionRegistry;
use crate::interpreter::{MessageProcessor, PipelineInterpreter};
use crate::loader::DefinitionLoader;
use crate::pipeline::PipelineDefinition;
use crate::rule::Rule;
use crate::service::{
    ConnectionsService, InMemoryConnectionsService, InMemoryPipelineService, InMemoryRuleService,
    PipelineService, RuleService,
};
use crate::state::{StateHandle, StateUpdater};
use crate::worker::{ProcessorWorkers, WorkerChannels};

/// 변경 이벤트 채널 용량
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// 프로세서 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessorLifecycle {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 파이프라인 프로세서
///
/// # 사용 예시
/// ```ignore
/// use ironpipe_pipeline_processor::PipelineProcessorBuilder;
///
/// let mut processor = PipelineProcessorBuilder::new().config(config).build()?;
/// let channels = processor.start().await?;
/// channels.input.send(batch).await?;
/// let processed = channels.output.recv().await;
/// processor.stop().await?;
/// ```
pub struct PipelineProcessor {
    config: ProcessorConfig,
    lifecycle: ProcessorLifecycle,
    registry: Arc<FunctionRegistry>,
    rules: Arc<dyn RuleService>,
    pipelines: Arc<dyn PipelineService>,
    connections: Arc<dyn ConnectionsService>,
    state: Arc<StateHandle>,
    interpreter: Arc<PipelineInterpreter>,
    change_tx: mpsc::Sender<ChangeEvent>,
    change_rx: Option<mpsc::Receiver<ChangeEvent>>,
    cancel: CancellationToken,
    updater_task: Option<JoinHandle<()>>,
    workers: Option<ProcessorWorkers>,
}

impl PipelineProcessor {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.lifecycle {
            ProcessorLifecycle::Initialized => "initialized",
            ProcessorLifecycle::Running => "running",
            ProcessorLifecycle::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn rule_service(&self) -> &Arc<dyn RuleService> {
        &self.rules
    }

    pub fn pipeline_service(&self) -> &Arc<dyn PipelineService> {
        &self.pipelines
    }

    pub fn connections_service(&self) -> &Arc<dyn ConnectionsService> {
        &self.connections
    }

    pub fn state(&self) -> &Arc<StateHandle> {
        &self.state
    }

    /// 배치를 직접 처리할 때 쓰는 인터프리터
    pub fn interpreter(&self) -> &Arc<PipelineInterpreter> {
        &self.interpreter
    }

    /// 변경 이벤트 송신측. 외부 저장소나 규칙 메트릭 설정 변경을 알릴 때 사용합니다.
    pub fn change_sender(&self) -> mpsc::Sender<ChangeEvent> {
        self.change_tx.clone()
    }

    /// 정의를 로드하고 갱신기와 워커를 시작합니다.
    ///
    /// # Errors
    /// - 이미 실행 중이거나 정지된 경우
    /// - 정의 디렉토리/파일을 읽을 수 없는 경우
    pub async fn start(&mut self) -> Result<WorkerChannels, ProcessorError> {
        match self.lifecycle {
            ProcessorLifecycle::Initialized => {}
            ProcessorLifecycle::Running => return Err(ProcessorError::AlreadyRunning),
            ProcessorLifecycle::Stopped => return Err(ProcessorError::CannotRestart),
        }
        let Some(mut change_rx) = self.change_rx.take() else {
            return Err(ProcessorError::CannotRestart);
        };

        tracing::info!("starting pipeline processor");

        // 1. 정의 로드
        if self.config.enabled {
            self.load_definitions().await?;
        } else {
            tracing::info!("processor disabled, skipping definition files");
        }

        // 2. 최초 스냅샷 (로딩 중 쌓인 이벤트는 이 스냅샷에 반영됨)
        while change_rx.try_recv().is_ok() {}
        let updater = StateUpdater::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.pipelines),
            Arc::clone(&self.connections),
            Arc::clone(&self.registry),
            Arc::clone(&self.state),
        )
        .with_rule_metrics(self.config.rule_metrics_enabled);
        updater.reload();
        self.updater_task = Some(tokio::spawn(updater.run(change_rx, self.cancel.clone())));

        // 3. 워커 시작
        let processor: Arc<dyn MessageProcessor> = self.interpreter.clone();
        let (workers, channels) = ProcessorWorkers::spawn(processor, &self.config)?;
        self.workers = Some(workers);

        self.lifecycle = ProcessorLifecycle::Running;
        tracing::info!("pipeline processor started");
        Ok(channels)
    }

    /// 워커와 갱신기를 멈춥니다. 처리 중인 배치는 끝까지 처리됩니다.
    pub async fn stop(&mut self) -> Result<(), ProcessorError> {
        if self.lifecycle != ProcessorLifecycle::Running {
            return Err(ProcessorError::NotRunning);
        }

        tracing::info!("stopping pipeline processor");
        self.cancel.cancel();

        if let Some(workers) = self.workers.take() {
            workers.shutdown().await;
        }
        if let Some(task) = self.updater_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "state updater terminated abnormally");
            }
        }

        self.lifecycle = ProcessorLifecycle::Stopped;
        tracing::info!("pipeline processor stopped");
        Ok(())
    }

    /// 설정된 디렉토리/파일의 정의를 저장소에 넣습니다.
    ///
    /// 저장소가 거부한 정의(예: 제목 중복)는 경고를 남기고 건너뜁니다.
    async fn load_definitions(&self) -> Result<(), ProcessorError> {
        let rules = DefinitionLoader::load_directory::<Rule>(&self.config.rules_dir).await?;
        for rule in rules {
            let id = rule.id.clone();
            if let Err(e) = self.rules.save(rule) {
                tracing::warn!(rule_id = %id, error = %e, "rule rejected by store, skipping");
            }
        }

        let pipelines =
            DefinitionLoader::load_directory::<PipelineDefinition>(&self.config.pipelines_dir)
                .await?;
        for pipeline in pipelines {
            let id = pipeline.id.clone();
            if let Err(e) = self.pipelines.save(pipeline) {
                tracing::warn!(
                    pipeline_id = %id,
                    error = %e,
                    "pipeline rejected by store, skipping"
                );
            }
        }

        let connections = DefinitionLoader::load_connections(&self.config.connections_file).await?;
        for connection in connections {
            let stream_id = connection.stream_id.clone();
            if let Err(e) = self.connections.save(connection) {
                tracing::warn!(
                    stream_id = %stream_id,
                    error = %e,
                    "connections rejected by store, skipping"
                );
            }
        }
        Ok(())
    }
}

/// 프로세서 빌더
///
/// 저장소를 지정하지 않으면 변경 알림이 연결된 인메모리 저장소를 만듭니다.
/// 직접 지정한 저장소는 [`PipelineProcessor::change_sender`]로 변경을 알려야 합니다.
pub struct PipelineProcessorBuilder {
    config: ProcessorConfig,
    registry: Option<FunctionRegistry>,
    rules: Option<Arc<dyn RuleService>>,
    pipelines: Option<Arc<dyn PipelineService>>,
    connections: Option<Arc<dyn ConnectionsService>>,
}

impl PipelineProcessorBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
            registry: None,
            rules: None,
            pipelines: None,
            connections: None,
        }
    }

    /// 프로세서 설정을 지정합니다.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// 함수 레지스트리를 지정합니다. 지정하지 않으면 내장 함수 레지스트리를 사용합니다.
    pub fn registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn rule_service(mut self, service: Arc<dyn RuleService>) -> Self {
        self.rules = Some(service);
        self
    }

    pub fn pipeline_service(mut self, service: Arc<dyn PipelineService>) -> Self {
        self.pipelines = Some(service);
        self
    }

    pub fn connections_service(mut self, service: Arc<dyn ConnectionsService>) -> Self {
        self.connections = Some(service);
        self
    }

    /// 프로세서를 빌드합니다.
    pub fn build(self) -> Result<PipelineProcessor, ProcessorError> {
        self.config.validate()?;

        let registry = match self.registry {
            Some(registry) => registry,
            None => FunctionRegistry::builtin()?,
        };
        let registry = Arc::new(registry);

        let (change_tx, change_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let rules = self.rules.unwrap_or_else(|| {
            Arc::new(InMemoryRuleService::new().with_notifier(change_tx.clone()))
        });
        let pipelines = self.pipelines.unwrap_or_else(|| {
            Arc::new(InMemoryPipelineService::new().with_notifier(change_tx.clone()))
        });
        let connections = self.connections.unwrap_or_else(|| {
            Arc::new(InMemoryConnectionsService::new().with_notifier(change_tx.clone()))
        });

        let state = Arc::new(StateHandle::default());
        let interpreter = Arc::new(PipelineInterpreter::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            self.config.max_stream_rounds,
        ));

        Ok(PipelineProcessor {
            config: self.config,
            lifecycle: ProcessorLifecycle::Initialized,
            registry,
            rules,
            pipelines,
            connections,
            state,
            interpreter,
            change_tx,
            change_rx: Some(change_rx),
            cancel: CancellationToken::new(),
            updater_task: None,
            workers: None,
        })
    }
}

impl Default for PipelineProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use ironpipe_core::message::Message;
    use ironpipe_core::types::Value;

    use super::*;
    use crate::ast::{Expression, FunctionCall, Statement};
    use crate::pipeline::{DEFAULT_STREAM_ID, MatchPolicy, PipelineConnections};

    fn disabled_config() -> ProcessorConfig {
        ProcessorConfig {
            enabled: false,
            worker_count: 2,
            ..ProcessorConfig::default()
        }
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let mut processor = PipelineProcessorBuilder::new()
            .config(disabled_config())
            .build()
            .unwrap();
        assert_eq!(processor.state_name(), "initialized");
        assert!(matches!(processor.stop().await, Err(ProcessorError::NotRunning)));

        let _channels = processor.start().await.unwrap();
        assert_eq!(processor.state_name(), "running");
        assert!(matches!(processor.start().await, Err(ProcessorError::AlreadyRunning)));

        processor.stop().await.unwrap();
        assert_eq!(processor.state_name(), "stopped");
        assert!(matches!(processor.start().await, Err(ProcessorError::CannotRestart)));
    }

    #[tokio::test]
    async fn definitions_saved_while_running_take_effect() {
        let mut processor = PipelineProcessorBuilder::new()
            .config(disabled_config())
            .build()
            .unwrap();
        let mut channels = processor.start().await.unwrap();

        let rule = Rule::new("r1", "tag", Expression::literal(true)).then(Statement::call(
            FunctionCall::new("set_field")
                .arg("field", Expression::literal("tagged"))
                .arg("value", Expression::literal(true)),
        ));
        processor.rule_service().save(rule).unwrap();
        processor
            .pipeline_service()
            .save(PipelineDefinition::new("p1", "p1").stage(0, MatchPolicy::All, ["r1"]))
            .unwrap();
        processor
            .connections_service()
            .save(PipelineConnections::new(DEFAULT_STREAM_ID, ["p1"]))
            .unwrap();

        let mut applied = false;
        for _ in 0..100 {
            if !processor.state().current().connections().is_empty() {
                applied = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(applied);

        channels
            .input
            .send(vec![Message::with_id("m")])
            .await
            .unwrap();
        let out = channels.output.recv().await.unwrap();
        assert_eq!(out[0].field("tagged"), Some(&Value::Boolean(true)));

        processor.stop().await.unwrap();
    }

    #[test]
    fn build_rejects_invalid_config() {
        let config = ProcessorConfig {
            worker_count: 0,
            ..disabled_config()
        };
        assert!(PipelineProcessorBuilder::new().config(config).build().is_err());
    }
}
