//! 파이프라인과 스테이지
//!
//! 정의([`PipelineDefinition`])는 저장소와 YAML 문서에 쓰이는 형태이고,
//! 실행 형태([`Pipeline`])는 스냅샷 구성 시 규칙 참조를 풀어 만든 불변 구조입니다.
//! 실행 형태의 스테이지는 번호 오름차순으로 정렬되어 있고 비어 있지 않습니다.

pub mod connections;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, ServiceError};
use crate::rule::{Rule, RuleSet};

pub use connections::{DEFAULT_STREAM_ID, PipelineConnections};

/// 스테이지 매치 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// 모든 규칙이 매치해야 다음 스테이지로 진행
    #[default]
    All,
    /// 하나 이상의 규칙이 매치하면 진행
    Either,
    /// 결과와 상관없이 항상 진행
    Pass,
}

impl MatchPolicy {
    /// 매치 결과가 정책을 만족하는지 확인합니다.
    ///
    /// 규칙이 없는 스테이지는 스냅샷에 들어오지 않으므로 `total`은 항상 1 이상입니다.
    pub fn is_satisfied(self, matched: usize, total: usize) -> bool {
        debug_assert!(total > 0, "stage without rules reached the policy check");
        match self {
            Self::All => matched == total,
            Self::Either => matched > 0,
            Self::Pass => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Either => "either",
            Self::Pass => "pass",
        }
    }
}

impl std::fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스테이지 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// 실행 순서 (오름차순, 간격 허용)
    pub stage: i32,
    #[serde(rename = "match", default)]
    pub match_policy: MatchPolicy,
    /// 규칙 ID 또는 제목
    #[serde(default)]
    pub rules: Vec<String>,
}

/// 파이프라인 정의
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            stages: Vec::new(),
        }
    }

    /// 스테이지를 추가합니다.
    pub fn stage<I, S>(mut self, number: i32, match_policy: MatchPolicy, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages.push(StageDefinition {
            stage: number,
            match_policy,
            rules: rules.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// 문서 형식을 검증합니다. 참조 무결성은 [`Pipeline::resolve`]에서 확인합니다.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let invalid = |reason: &str| ServiceError::Invalid {
            kind: "pipeline",
            reason: reason.to_owned(),
        };
        if self.id.is_empty() {
            return Err(invalid("pipeline id must not be empty"));
        }
        if self.id.len() > 256 {
            return Err(invalid("pipeline id must not exceed 256 characters"));
        }
        if self.title.trim().is_empty() {
            return Err(invalid("pipeline title must not be empty"));
        }
        Ok(())
    }
}

/// 실행 가능한 스테이지
#[derive(Debug, Clone)]
pub struct Stage {
    number: i32,
    policy: MatchPolicy,
    rules: Vec<Arc<Rule>>,
}

impl Stage {
    pub fn number(&self) -> i32 {
        self.number
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// 선언 순서의 규칙
    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }
}

/// 실행 가능한 파이프라인
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: String,
    title: String,
    stages: Vec<Stage>,
}

impl Pipeline {
    /// 정의의 규칙 참조를 풀어 실행 형태를 만듭니다.
    ///
    /// # Errors
    /// - 스테이지가 없음 (`EmptyPipeline`)
    /// - 같은 스테이지 번호가 두 번 (`DuplicateStage`)
    /// - 규칙이 없는 스테이지 (`EmptyStage`)
    /// - 찾을 수 없는 규칙 참조 (`DanglingRule`)
    pub fn resolve(
        definition: &PipelineDefinition,
        rules: &RuleSet,
    ) -> Result<Self, ConfigurationError> {
        if definition.stages.is_empty() {
            return Err(ConfigurationError::EmptyPipeline(definition.id.clone()));
        }

        let mut seen = BTreeSet::new();
        let mut stages = Vec::with_capacity(definition.stages.len());
        for stage in &definition.stages {
            if !seen.insert(stage.stage) {
                return Err(ConfigurationError::DuplicateStage {
                    pipeline_id: definition.id.clone(),
                    stage: stage.stage,
                });
            }
            if stage.rules.is_empty() {
                return Err(ConfigurationError::EmptyStage {
                    pipeline_id: definition.id.clone(),
                    stage: stage.stage,
                });
            }

            let resolved = stage
                .rules
                .iter()
                .map(|reference| {
                    rules
                        .get(reference)
                        .cloned()
                        .ok_or_else(|| ConfigurationError::DanglingRule {
                            pipeline_id: definition.id.clone(),
                            stage: stage.stage,
                            rule: reference.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            stages.push(Stage {
                number: stage.stage,
                policy: stage.match_policy,
                rules: resolved,
            });
        }
        stages.sort_by_key(|s| s.number);

        Ok(Self {
            id: definition.id.clone(),
            title: definition.title.clone(),
            stages,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// 번호 오름차순 스테이지
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// 이 파이프라인이 참조하는 규칙 수 (중복 포함)
    pub fn rule_count(&self) -> usize {
        self.stages.iter().map(|s| s.rules.len()).sum()
    }
}
