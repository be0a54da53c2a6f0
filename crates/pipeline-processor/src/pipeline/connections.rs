//! 스트림-파이프라인 연결

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// 어떤 스트림에도 속하지 않은 메시지가 사용하는 스트림 ID
pub const DEFAULT_STREAM_ID: &str = "default";

/// 한 스트림이 트리거하는 파이프라인 집합
///
/// 스트림당 하나만 존재하며, 저장하면 이전 집합을 대체합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConnections {
    pub stream_id: String,
    #[serde(default)]
    pub pipeline_ids: BTreeSet<String>,
}

impl PipelineConnections {
    pub fn new<I, S>(stream_id: impl Into<String>, pipeline_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream_id: stream_id.into(),
            pipeline_ids: pipeline_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.stream_id.trim().is_empty() {
            return Err(ServiceError::Invalid {
                kind: "connections",
                reason: "stream id must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_connections_document() {
        let yaml = r#"
- stream_id: default
  pipeline_ids: [p2, p1, p1]
- stream_id: auth
"#;
        let docs: Vec<PipelineConnections> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            docs[0],
            PipelineConnections::new(DEFAULT_STREAM_ID, ["p1", "p2"])
        );
        assert!(docs[1].pipeline_ids.is_empty());
    }

    #[test]
    fn empty_stream_rejected() {
        assert!(PipelineConnections::new(" ", ["p1"]).validate().is_err());
    }
}
