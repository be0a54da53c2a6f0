//! 메시지 — 파이프라인이 처리하는 키/값 레코드
//!
//! 엔진은 필드를 읽고 쓰며 스트림 소속을 바꾸지만, 메시지의 생성과
//! 저장/확인 응답 같은 생명주기는 외부 수집기가 소유합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// 처리 에러 원인 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingErrorCause {
    /// 규칙 WHEN 평가 실패
    RuleConditionEvaluationError,
    /// 규칙 THEN 액션 실행 실패
    RuleStatementEvaluationError,
}

impl fmt::Display for ProcessingErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuleConditionEvaluationError => f.write_str("RuleConditionEvaluationError"),
            Self::RuleStatementEvaluationError => f.write_str("RuleStatementEvaluationError"),
        }
    }
}

/// 메시지에 기록된 처리 에러
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    /// 원인 분류
    pub cause: ProcessingErrorCause,
    /// 요약 (규칙/파이프라인 식별 포함)
    pub message: String,
    /// 상세 에러 내용
    pub details: String,
}

/// 로그 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 메시지 ID (기본값: UUID v4)
    #[serde(default = "new_message_id")]
    id: String,
    /// 필드
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    /// 소속 스트림 ID
    #[serde(default)]
    streams: BTreeSet<String>,
    /// 드롭 표시
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    filter_out: bool,
    /// 처리 중 기록된 에러
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    processing_errors: Vec<ProcessingError>,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    /// 새 ID로 빈 메시지를 만듭니다.
    pub fn new() -> Self {
        Self::with_id(new_message_id())
    }

    /// 주어진 ID로 빈 메시지를 만듭니다.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
            streams: BTreeSet::new(),
            filter_out: false,
            processing_errors: Vec::new(),
        }
    }

    /// 필드를 설정하는 빌더 메서드
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    /// 스트림을 추가하는 빌더 메서드
    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.streams.insert(stream_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// 필드를 설정합니다. `Null`을 설정하면 필드가 제거됩니다.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        match value.into() {
            Value::Null => {
                self.fields.remove(&name);
            }
            value => {
                self.fields.insert(name, value);
            }
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// 필드 이름을 바꿉니다. 원래 필드가 없으면 `false`를 반환합니다.
    pub fn rename_field(&mut self, old: &str, new: impl Into<String>) -> bool {
        match self.fields.remove(old) {
            Some(value) => {
                self.fields.insert(new.into(), value);
                true
            }
            None => false,
        }
    }

    pub fn streams(&self) -> &BTreeSet<String> {
        &self.streams
    }

    pub fn in_stream(&self, stream_id: &str) -> bool {
        self.streams.contains(stream_id)
    }

    /// 스트림을 추가합니다. 새로 추가되었으면 `true`
    pub fn add_stream(&mut self, stream_id: impl Into<String>) -> bool {
        self.streams.insert(stream_id.into())
    }

    /// 스트림에서 제거합니다. 소속되어 있었으면 `true`
    pub fn remove_stream(&mut self, stream_id: &str) -> bool {
        self.streams.remove(stream_id)
    }

    pub fn filter_out(&self) -> bool {
        self.filter_out
    }

    pub fn set_filter_out(&mut self, filter_out: bool) {
        self.filter_out = filter_out;
    }

    pub fn add_processing_error(&mut self, error: ProcessingError) {
        self.processing_errors.push(error);
    }

    pub fn processing_errors(&self) -> &[ProcessingError] {
        &self.processing_errors
    }

    /// 필드와 스트림을 복사한 새 메시지를 만듭니다 (새 ID, 처리 상태 초기화).
    pub fn duplicate(&self) -> Self {
        Self {
            id: new_message_id(),
            fields: self.fields.clone(),
            streams: self.streams.clone(),
            filter_out: false,
            processing_errors: Vec::new(),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "message id={} fields={} streams={}",
            self.id,
            self.fields.len(),
            self.streams.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_null_removes_field() {
        let mut msg = Message::new().with_field("a", 1_i64);
        assert!(msg.has_field("a"));
        msg.set_field("a", Value::Null);
        assert!(!msg.has_field("a"));
    }

    #[test]
    fn rename_moves_value() {
        let mut msg = Message::new().with_field("src", "10.0.0.1");
        assert!(msg.rename_field("src", "source_ip"));
        assert_eq!(msg.field("source_ip"), Some(&Value::from("10.0.0.1")));
        assert!(!msg.rename_field("missing", "x"));
    }

    #[test]
    fn duplicate_gets_new_id_and_clean_state() {
        let mut msg = Message::with_id("m1")
            .with_field("a", true)
            .with_stream("s1");
        msg.set_filter_out(true);
        let copy = msg.duplicate();
        assert_ne!(copy.id(), "m1");
        assert!(!copy.filter_out());
        assert!(copy.in_stream("s1"));
        assert_eq!(copy.field("a"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn deserialize_minimal_json_assigns_id() {
        let msg: Message = serde_json::from_str(r#"{"fields": {"n": 5}}"#).unwrap();
        assert!(!msg.id().is_empty());
        assert_eq!(msg.field("n"), Some(&Value::Long(5)));
        assert!(msg.streams().is_empty());
    }
}
