//! 파이프라인 인터프리터 -- 메시지 배치를 연결, 파이프라인, 스테이지, 규칙 순으로 처리
//!
//! # 처리 순서
//! 1. 메시지의 스트림(없으면 `default`)에 연결된 파이프라인을 ID 오름차순으로 실행
//! 2. 각 파이프라인은 스테이지를 번호 오름차순으로 실행하고, 스테이지의 모든 규칙을 평가한 뒤
//!    매치 정책으로 진행 여부를 결정
//! 3. 규칙이 새 스트림을 추가했다면 새 스트림에 연결된 파이프라인으로 다시 실행
//!    (메시지-스트림 쌍마다 한 번, 최대 `max_stream_rounds`회)
//! 4. 규칙이 만든 메시지는 큐 뒤에 붙어 같은 방식으로 처리
//!
//! 규칙 평가 에러는 규칙 경계에서 잡혀 메시지의 처리 에러 목록에 기록되고,
//! 해당 규칙은 매치하지 않은 것으로 취급됩니다. 스테이지, 파이프라인, 배치는 계속 진행합니다.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use ironpipe_core::message::{Message, ProcessingError, ProcessingErrorCause};
use ironpipe_core::metrics as m;

use crate::context::EvaluationContext;
use crate::error::EvalError;
use crate::function::FunctionRegistry;
use crate::pipeline::{DEFAULT_STREAM_ID, Pipeline};
use crate::rule::Rule;
use crate::state::{ProcessorState, StateHandle};

/// 메시지 배치 처리 계약
pub trait MessageProcessor: Send + Sync {
    /// 배치를 처리해 (변경되었을 수 있는) 배치를 반환합니다.
    ///
    /// 드롭된 메시지는 빠지고, 규칙이 만든 메시지는 추가됩니다.
    fn process(&self, messages: Vec<Message>) -> Vec<Message>;
}

/// 스냅샷 기반 파이프라인 인터프리터
pub struct PipelineInterpreter {
    registry: Arc<FunctionRegistry>,
    state: Arc<StateHandle>,
    max_stream_rounds: u32,
}

impl PipelineInterpreter {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        state: Arc<StateHandle>,
        max_stream_rounds: u32,
    ) -> Self {
        Self {
            registry,
            state,
            max_stream_rounds: max_stream_rounds.max(1),
        }
    }

    pub fn state(&self) -> &Arc<StateHandle> {
        &self.state
    }

    /// 주어진 스냅샷으로 배치를 처리합니다.
    pub fn process_with_state(
        &self,
        messages: Vec<Message>,
        state: &ProcessorState,
    ) -> Vec<Message> {
        let started = Instant::now();
        let mut queue: VecDeque<(Message, u32)> =
            messages.into_iter().map(|msg| (msg, 0)).collect();
        let mut output = Vec::with_capacity(queue.len());

        while let Some((mut message, generation)) = queue.pop_front() {
            if generation > self.max_stream_rounds {
                tracing::warn!(
                    msg_id = %message.id(),
                    generation,
                    "created message chain too deep, passing through unprocessed"
                );
                output.push(message);
                continue;
            }

            let created = self.process_message(&mut message, state);
            metrics::counter!(m::PROCESSOR_MESSAGES_PROCESSED_TOTAL).increment(1);
            queue.extend(created.into_iter().map(|msg| (msg, generation + 1)));

            if message.filter_out() {
                tracing::debug!(msg_id = %message.id(), "message dropped");
                metrics::counter!(m::PROCESSOR_MESSAGES_DROPPED_TOTAL).increment(1);
                continue;
            }
            output.push(message);
        }

        metrics::histogram!(m::PROCESSOR_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        output
    }

    /// 연결을 보지 않고 지정된 파이프라인으로만 메시지를 처리합니다 (시뮬레이션).
    ///
    /// 반환값의 첫 항목은 처리된 메시지이며 드롭 표시가 남아 있습니다.
    /// 나머지는 규칙이 만든 메시지로, 처리되지 않은 상태입니다.
    pub fn process_for_pipelines(
        &self,
        mut message: Message,
        pipeline_ids: &BTreeSet<String>,
        state: &ProcessorState,
    ) -> Vec<Message> {
        let mut created = Vec::new();
        self.run_pipelines(&mut message, pipeline_ids, state, &mut created);
        let mut output = Vec::with_capacity(created.len() + 1);
        output.push(message);
        output.extend(created);
        output
    }

    /// 한 메시지를 스트림 라운드 단위로 처리하고, 규칙이 만든 메시지를 반환합니다.
    fn process_message(&self, message: &mut Message, state: &ProcessorState) -> Vec<Message> {
        let mut created = Vec::new();
        let mut processed_streams: BTreeSet<String> = BTreeSet::new();

        for round in 0..self.max_stream_rounds {
            let pending: Vec<String> = if round == 0 && message.streams().is_empty() {
                vec![DEFAULT_STREAM_ID.to_owned()]
            } else {
                message
                    .streams()
                    .iter()
                    .filter(|s| !processed_streams.contains(*s))
                    .cloned()
                    .collect()
            };
            if pending.is_empty() {
                return created;
            }

            let pipeline_ids = state.pipelines_for_streams(pending.iter().map(String::as_str));
            tracing::debug!(
                msg_id = %message.id(),
                round,
                streams = ?pending,
                pipelines = ?pipeline_ids,
                "processing stream round"
            );
            processed_streams.extend(pending);

            self.run_pipelines(message, &pipeline_ids, state, &mut created);
            if message.filter_out() {
                return created;
            }
        }

        let unprocessed = message
            .streams()
            .iter()
            .filter(|s| !processed_streams.contains(*s))
            .count();
        if unprocessed > 0 {
            tracing::warn!(
                msg_id = %message.id(),
                max_rounds = self.max_stream_rounds,
                unprocessed,
                "stream round limit reached, remaining streams not processed"
            );
        }
        created
    }

    /// 파이프라인을 ID 순으로 실행합니다. 드롭되면 이후 파이프라인은 실행하지 않습니다.
    fn run_pipelines(
        &self,
        message: &mut Message,
        pipeline_ids: &BTreeSet<String>,
        state: &ProcessorState,
        created: &mut Vec<Message>,
    ) {
        for id in pipeline_ids {
            let Some(pipeline) = state.pipeline(id) else {
                tracing::debug!(
                    msg_id = %message.id(),
                    pipeline_id = %id,
                    "pipeline not in snapshot, skipping"
                );
                continue;
            };
            self.run_pipeline(message, pipeline, state, created);
            if message.filter_out() {
                return;
            }
        }
    }

    fn run_pipeline(
        &self,
        message: &mut Message,
        pipeline: &Pipeline,
        state: &ProcessorState,
        created: &mut Vec<Message>,
    ) {
        metrics::counter!(
            m::PROCESSOR_PIPELINE_EXECUTIONS_TOTAL,
            m::LABEL_PIPELINE_ID => pipeline.id().to_owned()
        )
        .increment(1);

        for stage in pipeline.stages() {
            // 모든 WHEN을 먼저 평가하므로 같은 스테이지의 THEN 변경은 조건에 보이지 않습니다.
            let to_run: Vec<&Arc<Rule>> = stage
                .rules()
                .iter()
                .filter(|rule| self.evaluate_rule(message, rule, pipeline, state, created))
                .collect();

            let mut matched = 0;
            for rule in to_run {
                if self.execute_rule(message, rule, pipeline, state, created) {
                    matched += 1;
                }
            }
            metrics::counter!(m::PROCESSOR_STAGE_EXECUTIONS_TOTAL).increment(1);

            if message.filter_out() {
                tracing::debug!(
                    msg_id = %message.id(),
                    pipeline_id = %pipeline.id(),
                    stage = stage.number(),
                    "message marked for drop, stopping"
                );
                return;
            }

            let total = stage.rules().len();
            if !stage.policy().is_satisfied(matched, total) {
                tracing::debug!(
                    msg_id = %message.id(),
                    pipeline_id = %pipeline.id(),
                    stage = stage.number(),
                    policy = %stage.policy(),
                    matched,
                    total,
                    "stage policy not satisfied, skipping remaining stages"
                );
                return;
            }
        }
    }

    /// 규칙의 WHEN을 새 컨텍스트에서 평가합니다. 에러는 기록되고 매치하지 않은 것으로 취급됩니다.
    fn evaluate_rule(
        &self,
        message: &mut Message,
        rule: &Rule,
        pipeline: &Pipeline,
        state: &ProcessorState,
        created: &mut Vec<Message>,
    ) -> bool {
        let mut ctx = EvaluationContext::new(message, &self.registry);
        let matched = match rule.evaluate_condition(&mut ctx) {
            Ok(matched) => matched,
            Err(error) => {
                record_rule_error(&mut ctx, Phase::Condition, rule, pipeline, state, &error);
                false
            }
        };

        tracing::debug!(
            msg_id = %ctx.message().id(),
            rule_id = %rule.id,
            pipeline_id = %pipeline.id(),
            matched,
            "rule condition evaluated"
        );
        created.extend(ctx.take_created_messages());
        matched
    }

    /// 매치한 규칙의 THEN을 새 컨텍스트에서 실행합니다. 모든 문장이 성공하면 true.
    fn execute_rule(
        &self,
        message: &mut Message,
        rule: &Rule,
        pipeline: &Pipeline,
        state: &ProcessorState,
        created: &mut Vec<Message>,
    ) -> bool {
        if state.rule_metrics_enabled() {
            metrics::counter!(
                m::PROCESSOR_RULE_MATCHES_TOTAL,
                m::LABEL_RULE_ID => rule.id.clone()
            )
            .increment(1);
        } else {
            metrics::counter!(m::PROCESSOR_RULE_MATCHES_TOTAL).increment(1);
        }

        let mut ctx = EvaluationContext::new(message, &self.registry);
        let succeeded = match rule.execute_actions(&mut ctx) {
            Ok(()) => true,
            Err(error) => {
                record_rule_error(&mut ctx, Phase::Action, rule, pipeline, state, &error);
                false
            }
        };
        created.extend(ctx.take_created_messages());
        succeeded
    }
}

impl MessageProcessor for PipelineInterpreter {
    fn process(&self, messages: Vec<Message>) -> Vec<Message> {
        let state = self.state.current();
        self.process_with_state(messages, &state)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Condition,
    Action,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Condition => "condition",
            Self::Action => "action",
        }
    }

    fn cause(self) -> ProcessingErrorCause {
        match self {
            Self::Condition => ProcessingErrorCause::RuleConditionEvaluationError,
            Self::Action => ProcessingErrorCause::RuleStatementEvaluationError,
        }
    }
}

fn record_rule_error(
    ctx: &mut EvaluationContext<'_>,
    phase: Phase,
    rule: &Rule,
    pipeline: &Pipeline,
    state: &ProcessorState,
    error: &EvalError,
) {
    tracing::debug!(
        msg_id = %ctx.message().id(),
        rule_id = %rule.id,
        pipeline_id = %pipeline.id(),
        phase = phase.as_str(),
        error = %error,
        "rule evaluation failed"
    );
    if state.rule_metrics_enabled() {
        metrics::counter!(
            m::PROCESSOR_RULE_ERRORS_TOTAL,
            m::LABEL_PHASE => phase.as_str(),
            m::LABEL_RULE_ID => rule.id.clone()
        )
        .increment(1);
    } else {
        metrics::counter!(m::PROCESSOR_RULE_ERRORS_TOTAL, m::LABEL_PHASE => phase.as_str())
            .increment(1);
    }

    ctx.message_mut().add_processing_error(ProcessingError {
        cause: phase.cause(),
        message: format!(
            "Error evaluating {} for rule <{}/{}> (pipeline <{}/{}>)",
            phase.as_str(),
            rule.title,
            rule.id,
            pipeline.title(),
            pipeline.id()
        ),
        details: error.to_string(),
    });
}
