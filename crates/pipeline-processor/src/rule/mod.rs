//! 규칙 -- 이름 있는 WHEN/THEN 쌍
//!
//! WHEN은 불리언 표현식이고, THEN은 WHEN이 참일 때 순서대로 실행되는 문장 목록입니다.
//! 규칙은 메시지마다 새 [`EvaluationContext`]에서 평가됩니다.
//!
//! # YAML 스키마
//! ```yaml
//! id: tag-ssh
//! title: tag ssh failures
//! when:
//!   compare: { op: eq, left: { field: process }, right: { literal: sshd } }
//! then:
//!   - call:
//!       function: set_field
//!       args: { field: { literal: tagged }, value: { literal: true } }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::eval::as_condition;
use crate::ast::{Expression, FunctionCall, Statement};
use crate::context::EvaluationContext;
use crate::error::{ConfigurationError, EvalError};
use crate::function::FunctionRegistry;

const MAX_ID_LEN: usize = 256;
const MAX_TITLE_LEN: usize = 256;

/// 규칙 정의
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 규칙 ID (저장소에서 유일)
    #[serde(default)]
    pub id: String,
    /// 규칙 제목 (저장소에서 유일, 스테이지에서 참조 가능)
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// 조건
    pub when: Expression,
    /// 조건이 참일 때 실행할 문장
    #[serde(default)]
    pub then: Vec<Statement>,
}

impl Rule {
    pub fn new(id: impl Into<String>, title: impl Into<String>, when: Expression) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            when,
            then: Vec::new(),
        }
    }

    /// 문장을 추가합니다.
    pub fn then(mut self, statement: Statement) -> Self {
        self.then.push(statement);
        self
    }

    /// 규칙 형식을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidRule {
            rule_id: if self.id.is_empty() {
                "(empty)".to_owned()
            } else {
                self.id.clone()
            },
            reason: reason.to_owned(),
        };

        if self.id.is_empty() {
            return Err(invalid("rule id must not be empty"));
        }
        if self.id.len() > MAX_ID_LEN {
            return Err(invalid("rule id must not exceed 256 characters"));
        }
        if self.title.trim().is_empty() {
            return Err(invalid("rule title must not be empty"));
        }
        if self.title.len() > MAX_TITLE_LEN {
            return Err(invalid("rule title must not exceed 256 characters"));
        }
        let empty_binding = self
            .then
            .iter()
            .any(|s| matches!(s, Statement::Let { name, .. } if name.is_empty()));
        if empty_binding {
            return Err(invalid("let binding name must not be empty"));
        }
        Ok(())
    }

    /// 모든 함수 호출을 레지스트리와 대조합니다.
    ///
    /// 알 수 없는 함수, 선언되지 않은 인자, 빠진 필수 인자를 찾아냅니다.
    pub fn check_functions(&self, registry: &FunctionRegistry) -> Result<(), ConfigurationError> {
        let mut calls: Vec<&FunctionCall> = Vec::new();
        self.when.visit_calls(&mut |call| calls.push(call));
        for statement in &self.then {
            match statement {
                Statement::Let { value, .. } => value.visit_calls(&mut |call| calls.push(call)),
                Statement::Call(call) => {
                    calls.push(call);
                    for arg in call.args.values() {
                        arg.visit_calls(&mut |call| calls.push(call));
                    }
                }
            }
        }

        for call in calls {
            let result = match registry.resolve(&call.function) {
                None => Err(EvalError::UnknownFunction(call.function.clone())),
                Some(function) => function.descriptor().check_call(&call.args),
            };
            if let Err(e) = result {
                return Err(ConfigurationError::InvalidRule {
                    rule_id: self.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// 상수 부분식을 접은 규칙을 반환합니다.
    pub fn fold_constants(&self, registry: &FunctionRegistry) -> Rule {
        Rule {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            when: self.when.fold_constants(registry),
            then: self
                .then
                .iter()
                .map(|s| s.fold_constants(registry))
                .collect(),
        }
    }

    /// WHEN을 평가합니다. `null`은 false이고 그 외 비불리언은 에러입니다.
    pub fn evaluate_condition(&self, ctx: &mut EvaluationContext<'_>) -> Result<bool, EvalError> {
        let value = self.when.evaluate(ctx)?;
        as_condition(value, "rule condition")
    }

    /// THEN 문장을 순서대로 실행합니다.
    ///
    /// 문장이 실패하면 남은 문장은 실행하지 않습니다. 이미 적용된 변경은 되돌리지 않습니다.
    pub fn execute_actions(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), EvalError> {
        for statement in &self.then {
            match statement {
                Statement::Let { name, value } => {
                    let value = value.evaluate(ctx)?;
                    ctx.define(name.clone(), value);
                }
                Statement::Call(call) => {
                    call.evaluate(ctx)?;
                }
            }
        }
        Ok(())
    }
}

/// 스테이지 참조를 풀기 위한 규칙 색인
///
/// 참조는 ID로 먼저 찾고, 없으면 제목으로 찾습니다.
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    by_id: HashMap<String, Arc<Rule>>,
    by_title: HashMap<String, Arc<Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: Arc<Rule>) {
        self.by_title.insert(rule.title.clone(), Arc::clone(&rule));
        self.by_id.insert(rule.id.clone(), rule);
    }

    pub fn get(&self, reference: &str) -> Option<&Arc<Rule>> {
        self.by_id
            .get(reference)
            .or_else(|| self.by_title.get(reference))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        for rule in iter {
            set.insert(Arc::new(rule));
        }
        set
    }
}
