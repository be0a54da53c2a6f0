//! 규칙 평가 컨텍스트
//!
//! 규칙 하나를 메시지 하나에 대해 평가하는 동안만 살아 있는 스코프입니다.
//! 규칙마다 새로 만들어지므로 `let` 변수는 규칙 사이에 공유되지 않습니다.

use std::collections::HashMap;

use ironpipe_core::message::Message;
use ironpipe_core::types::Value;

use crate::function::FunctionRegistry;

/// 평가 컨텍스트
///
/// 현재 메시지에 대한 배타적 가변 참조, 읽기 전용 함수 레지스트리,
/// 규칙 로컬 변수, 평가 중 생성된 메시지를 가집니다.
pub struct EvaluationContext<'m> {
    message: &'m mut Message,
    registry: &'m FunctionRegistry,
    variables: HashMap<String, Value>,
    created: Vec<Message>,
}

impl<'m> EvaluationContext<'m> {
    pub fn new(message: &'m mut Message, registry: &'m FunctionRegistry) -> Self {
        Self {
            message,
            registry,
            variables: HashMap::new(),
            created: Vec::new(),
        }
    }

    /// 현재 메시지
    pub fn message(&self) -> &Message {
        &*self.message
    }

    /// 현재 메시지 (가변)
    pub fn message_mut(&mut self) -> &mut Message {
        &mut *self.message
    }

    /// 함수 레지스트리
    ///
    /// 반환 참조는 컨텍스트가 아닌 레지스트리 수명을 가지므로,
    /// 찾은 함수를 들고 있는 동안에도 컨텍스트를 가변으로 빌릴 수 있습니다.
    pub fn registry(&self) -> &'m FunctionRegistry {
        self.registry
    }

    /// 변수를 바인딩합니다. 같은 이름은 덮어씁니다.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// 변수를 조회합니다.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// 평가 중 생성된 메시지를 추가합니다.
    pub fn add_created_message(&mut self, message: Message) {
        self.created.push(message);
    }

    /// 생성된 메시지 수
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    /// 생성된 메시지를 꺼냅니다.
    pub fn take_created_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.created)
    }
}
