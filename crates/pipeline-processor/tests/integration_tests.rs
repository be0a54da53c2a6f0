//! 통합 테스트 -- 평가기, 함수, 스테이지 정책, 저장소, 로더 전체 흐름 검증

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;

use ironpipe_core::message::{Message, ProcessingErrorCause};
use ironpipe_core::period::Period;
use ironpipe_core::types::{Value, ValueType};
use ironpipe_pipeline_processor::{
    CompareOp, ConnectionsService, DEFAULT_STREAM_ID, DefinitionLoader, EvalError,
    EvaluationContext, Expression, Function, FunctionArgs, FunctionCall, FunctionDescriptor,
    FunctionRegistry, InMemoryConnectionsService, InMemoryRuleService, MatchPolicy,
    MessageProcessor, PipelineConnections, PipelineDefinition, PipelineInterpreter,
    PipelineProcessorBuilder, ProcessorConfig, ProcessorState, Rule, RuleService, ServiceError,
    StateHandle, Statement,
};

fn registry() -> Arc<FunctionRegistry> {
    Arc::new(FunctionRegistry::builtin().expect("builtin registry"))
}

fn evaluate(expr: &Expression) -> Result<Value, EvalError> {
    let registry = registry();
    let mut message = Message::with_id("test");
    let mut ctx = EvaluationContext::new(&mut message, &registry);
    expr.evaluate(&mut ctx)
}

fn set_field(name: &str, value: impl Into<Value>) -> Statement {
    Statement::call(
        FunctionCall::new("set_field")
            .arg("field", Expression::literal(name))
            .arg("value", Expression::Literal(value.into())),
    )
}

fn interpreter_for(
    rules: Vec<Rule>,
    pipelines: Vec<PipelineDefinition>,
    connections: Vec<PipelineConnections>,
) -> PipelineInterpreter {
    let registry = registry();
    let state = ProcessorState::build(rules, pipelines, connections, &registry, false);
    PipelineInterpreter::new(registry, Arc::new(StateHandle::new(state)), 10)
}

// ─── 인덱스 접근 ─────────────────────────────────────────────────────

#[test]
fn index_zero_returns_first_element_for_every_container() {
    let list = Value::List(vec![Value::from("a"), Value::from("b")]);
    let set = Value::set([Value::from("a"), Value::from("b")]);
    for target in [list, set] {
        let expr = Expression::index(Expression::Literal(target), Expression::literal(0));
        assert_eq!(evaluate(&expr).unwrap(), Value::from("a"));
    }

    // 필드 참조를 통한 리스트
    let registry = registry();
    let mut message = Message::with_id("m").with_field("tags", vec![Value::from("first")]);
    let mut ctx = EvaluationContext::new(&mut message, &registry);
    let expr = Expression::index(Expression::field("tags"), Expression::literal(0));
    assert_eq!(expr.evaluate(&mut ctx).unwrap(), Value::from("first"));
}

#[test]
fn indexing_a_number_is_invalid_target() {
    let expr = Expression::index(Expression::literal(23), Expression::literal(0));
    assert!(matches!(
        evaluate(&expr),
        Err(EvalError::InvalidIndexTarget { .. })
    ));
}

#[test]
fn map_access_by_key() {
    let mut map = BTreeMap::new();
    map.insert("string".to_owned(), Value::Long(23));
    let expr =
        Expression::index(
            Expression::Literal(Value::Map(map)),
            Expression::literal("string"),
        );
    assert_eq!(evaluate(&expr).unwrap(), Value::Long(23));
}

// ─── 단락 평가 ──────────────────────────────────────────────────────

#[test]
fn and_or_short_circuit() {
    let raises = || Expression::call(FunctionCall::new("does_not_exist"));
    assert!(evaluate(&raises()).is_err());

    let and = Expression::And(vec![Expression::literal(false), raises()]);
    assert_eq!(evaluate(&and).unwrap(), Value::Boolean(false));

    let or = Expression::Or(vec![Expression::literal(true), raises()]);
    assert_eq!(evaluate(&or).unwrap(), Value::Boolean(true));
}

// ─── 스테이지 정책 ───────────────────────────────────────────────────

fn policy_scenario(policy: MatchPolicy) -> Message {
    let interp = interpreter_for(
        vec![
            Rule::new("r1", "matches", Expression::literal(true)),
            Rule::new("r2", "does not match", Expression::literal(false)),
            Rule::new("r3", "later stage", Expression::literal(true))
                .then(set_field("reached", true)),
        ],
        vec![
            PipelineDefinition::new("p1", "policy")
                .stage(0, policy, ["r1", "r2"])
                .stage(1, MatchPolicy::All, ["r3"]),
        ],
        vec![PipelineConnections::new(DEFAULT_STREAM_ID, ["p1"])],
    );
    let mut out = interp.process(vec![Message::with_id("m")]);
    assert_eq!(out.len(), 1);
    out.remove(0)
}

#[test]
fn stage_policy_all_halts_pipeline() {
    assert!(!policy_scenario(MatchPolicy::All).has_field("reached"));
}

#[test]
fn stage_policy_either_proceeds() {
    assert!(policy_scenario(MatchPolicy::Either).has_field("reached"));
}

#[test]
fn stage_policy_pass_always_proceeds() {
    assert!(policy_scenario(MatchPolicy::Pass).has_field("reached"));
}

// ─── 장애 격리 ──────────────────────────────────────────────────────

#[test]
fn failing_rule_does_not_affect_sibling() {
    let interp = interpreter_for(
        vec![
            Rule::new(
                "a",
                "rule a",
                Expression::call(FunctionCall::new("unknown_fn")),
            ),
            Rule::new("b", "rule b", Expression::literal(true)).then(set_field("x", "set")),
            Rule::new("c", "rule c", Expression::literal(true)).then(set_field("next", true)),
        ],
        vec![
            PipelineDefinition::new("p1", "isolation")
                .stage(0, MatchPolicy::Either, ["a", "b"])
                .stage(1, MatchPolicy::All, ["c"]),
        ],
        vec![PipelineConnections::new("s1", ["p1"])],
    );
    let out = interp.process(vec![Message::with_id("m").with_stream("s1")]);
    let message = &out[0];

    assert_eq!(message.field("x"), Some(&Value::from("set")));
    assert!(message.has_field("next"));
    let errors = message.processing_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].cause,
        ProcessingErrorCause::RuleConditionEvaluationError
    );
    assert!(errors[0].details.contains("unknown_fn"));
}

#[test]
fn batch_continues_after_bad_message() {
    let interp = interpreter_for(
        vec![Rule::new(
            "r1",
            "needs number",
            Expression::compare(
                CompareOp::Gt,
                Expression::field("n"),
                Expression::literal(1),
            ),
        )
        .then(set_field("big", true))],
        vec![PipelineDefinition::new("p1", "p1").stage(0, MatchPolicy::All, ["r1"])],
        vec![PipelineConnections::new(DEFAULT_STREAM_ID, ["p1"])],
    );
    let out = interp.process(vec![
        Message::with_id("bad").with_field("n", "text"),
        Message::with_id("good").with_field("n", 5),
    ]);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].processing_errors().len(), 1);
    assert_eq!(out[1].field("big"), Some(&Value::Boolean(true)));
}

#[test]
fn same_stage_conditions_evaluated_before_any_actions() {
    let has_marker = || {
        Expression::call(FunctionCall::new("has_field").arg("field", Expression::literal("marker")))
    };
    let interp = interpreter_for(
        vec![
            Rule::new("a", "sets marker", Expression::literal(true))
                .then(set_field("marker", true)),
            Rule::new("b", "sees marker", has_marker()).then(set_field("same_stage", true)),
            Rule::new("c", "next stage", has_marker()).then(set_field("next_stage", true)),
        ],
        vec![
            PipelineDefinition::new("p1", "ordering")
                .stage(0, MatchPolicy::Pass, ["a", "b"])
                .stage(1, MatchPolicy::Pass, ["c"]),
        ],
        vec![PipelineConnections::new(DEFAULT_STREAM_ID, ["p1"])],
    );
    let out = interp.process(vec![Message::with_id("m")]);
    let message = &out[0];

    assert!(message.has_field("marker"));
    assert!(!message.has_field("same_stage"));
    assert!(message.has_field("next_stage"));
}

// ─── 저장소 ─────────────────────────────────────────────────────────

#[test]
fn duplicate_titles() {
    let service = InMemoryRuleService::new();
    service
        .save(Rule::new("r1", "shared title", Expression::literal(true)))
        .unwrap();

    let conflict = service.save(Rule::new("r2", "shared title", Expression::literal(true)));
    assert!(matches!(conflict, Err(ServiceError::DuplicateTitle { .. })));

    service
        .save(Rule::new("r1", "shared title", Expression::literal(false)))
        .unwrap();

    service.delete("r1").unwrap();
    service
        .save(Rule::new("r2", "shared title", Expression::literal(true)))
        .unwrap();
}

#[test]
fn connections_replace_not_merge() {
    let service = InMemoryConnectionsService::new();
    service
        .save(PipelineConnections::new("stream", ["p1", "p2"]))
        .unwrap();
    service
        .save(PipelineConnections::new("stream", ["p3"]))
        .unwrap();

    let loaded = service.load("stream").unwrap();
    assert_eq!(
        loaded.pipeline_ids.into_iter().collect::<Vec<_>>(),
        vec!["p3"]
    );
}

// ─── 함수 ───────────────────────────────────────────────────────────

#[test]
fn hours_transform_equals_iso_period() {
    let expr = Expression::call(FunctionCall::new("hours").arg("value", Expression::literal(2)));
    assert_eq!(
        evaluate(&expr).unwrap(),
        Value::from(Period::parse("PT2H").unwrap())
    );
}

/// 호출 횟수를 세고 고정 접두어를 반환하는 함수
struct CountingPrefix {
    descriptor: FunctionDescriptor,
    calls: Arc<AtomicUsize>,
}

impl Function for CountingPrefix {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn evaluate(
        &self,
        _args: &mut FunctionArgs<'_>,
        _ctx: &mut EvaluationContext<'_>,
    ) -> Result<Value, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::from("pre_"))
    }
}

#[test]
fn optional_argument_not_requested_is_never_evaluated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = FunctionRegistry::builtin().expect("builtin registry");
    registry
        .register(CountingPrefix {
            descriptor: FunctionDescriptor::builder("counted_prefix", ValueType::String).build(),
            calls: Arc::clone(&calls),
        })
        .expect("register counting function");

    let set_with_prefix = |value: Expression| {
        FunctionCall::new("set_field")
            .arg("field", Expression::literal("f"))
            .arg("value", value)
            .arg(
                "prefix",
                Expression::call(FunctionCall::new("counted_prefix")),
            )
    };
    let mut message = Message::with_id("m");
    let mut ctx = EvaluationContext::new(&mut message, &registry);

    // null 값이면 set_field는 prefix를 요청하지 않음
    let result = set_with_prefix(Expression::field("absent")).evaluate(&mut ctx);
    assert_eq!(result, Ok(Value::Null));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    set_with_prefix(Expression::literal("v"))
        .evaluate(&mut ctx)
        .expect("set_field with a value");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.message().field("pre_f"), Some(&Value::from("v")));
}

const SCHEMES: [&str; 5] = ["base16", "base32", "base32human", "base64", "base64url"];

fn round_trip(scheme: &str, input: &str, omit_padding: bool) -> Value {
    let encode = FunctionCall::new(format!("{scheme}_encode"))
        .arg("value", Expression::literal(input))
        .arg("omit_padding", Expression::literal(omit_padding));
    let decode =
        FunctionCall::new(format!("{scheme}_decode")).arg("value", Expression::call(encode));
    evaluate(&Expression::call(decode)).unwrap()
}

proptest! {
    #[test]
    fn encode_decode_round_trip(input in "[ -~]{0,64}", omit_padding in any::<bool>()) {
        for scheme in SCHEMES {
            prop_assert_eq!(
                round_trip(scheme, &input, omit_padding),
                Value::from(input.as_str())
            );
        }
    }
}

// ─── 로더 ───────────────────────────────────────────────────────────

const RULE_YAML: &str = r#"
id: tag-ssh
title: tag ssh failures
when:
  and:
    - compare: { op: eq, left: { field: process }, right: { literal: sshd } }
    - call: { function: contains, args: { value: { field: message }, search: { literal: Failed } } }
then:
  - let: { name: ip, value: { field: source_ip } }
  - call: { function: set_field, args: { field: { literal: ssh_ip }, value: { var: ip } } }
"#;

const PIPELINE_YAML: &str = r#"
id: auth
title: authentication
stages:
  - stage: 0
    match: all
    rules: [tag ssh failures]
"#;

const CONNECTIONS_YAML: &str = r#"
- stream_id: default
  pipeline_ids: [auth]
"#;

#[tokio::test]
async fn loader_skips_bad_files_and_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.yml"), RULE_YAML).unwrap();
    std::fs::write(dir.path().join("b.yaml"), RULE_YAML).unwrap();
    std::fs::write(dir.path().join("broken.yml"), "id: [unclosed").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let rules = DefinitionLoader::load_directory::<Rule>(dir.path()).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, "tag-ssh");
}

#[tokio::test]
async fn processor_loads_definitions_from_disk() {
    let root = tempfile::tempdir().unwrap();
    let rules_dir = root.path().join("rules");
    let pipelines_dir = root.path().join("pipelines");
    std::fs::create_dir(&rules_dir).unwrap();
    std::fs::create_dir(&pipelines_dir).unwrap();
    std::fs::write(rules_dir.join("tag-ssh.yml"), RULE_YAML).unwrap();
    std::fs::write(pipelines_dir.join("auth.yml"), PIPELINE_YAML).unwrap();
    let connections_file = root.path().join("connections.yml");
    std::fs::write(&connections_file, CONNECTIONS_YAML).unwrap();

    let config = ProcessorConfig {
        enabled: true,
        rules_dir: rules_dir.display().to_string(),
        pipelines_dir: pipelines_dir.display().to_string(),
        connections_file: connections_file.display().to_string(),
        worker_count: 2,
        ..ProcessorConfig::default()
    };
    let mut processor = PipelineProcessorBuilder::new()
        .config(config)
        .build()
        .unwrap();
    let mut channels = processor.start().await.unwrap();

    let message = Message::with_id("m1")
        .with_field("process", "sshd")
        .with_field("message", "Failed password for root")
        .with_field("source_ip", "10.0.0.7");
    channels.input.send(vec![message]).await.unwrap();
    let out = channels.output.recv().await.unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].field("ssh_ip"), Some(&Value::from("10.0.0.7")));
    assert!(out[0].processing_errors().is_empty());

    processor.stop().await.unwrap();
}
