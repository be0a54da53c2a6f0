//! 정의 파일 로더 -- 규칙, 파이프라인, 연결 문서를 디스크에서 로드합니다.
//!
//! 디렉토리 내의 `.yml`/`.yaml` 파일을 스캔하고 파싱합니다.
//! 개별 파일 파싱 실패와 중복 ID는 경고 로그를 남기고 건너뜁니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::ProcessorError;
use crate::pipeline::{PipelineConnections, PipelineDefinition};
use crate::rule::Rule;

const MAX_DEFINITION_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_DEFINITIONS_COUNT: usize = 10_000;

/// 디렉토리 단위로 로드되는 정의 문서
pub trait Definition: DeserializeOwned {
    /// 로그에 쓰는 종류 이름
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// 파싱 직후 형식 검증
    fn validate(&self) -> Result<(), ProcessorError>;
}

impl Definition for Rule {
    const KIND: &'static str = "rule";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ProcessorError> {
        Ok(Rule::validate(self)?)
    }
}

impl Definition for PipelineDefinition {
    const KIND: &'static str = "pipeline";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ProcessorError> {
        Ok(PipelineDefinition::validate(self)?)
    }
}

/// 정의 파일 로더
pub struct DefinitionLoader;

impl DefinitionLoader {
    /// 디렉토리에서 모든 YAML 정의 파일을 로드합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 정의 수가 `MAX_DEFINITIONS_COUNT`를 초과하는 경우
    pub async fn load_directory<T: Definition>(
        dir: impl AsRef<Path>,
    ) -> Result<Vec<T>, ProcessorError> {
        let dir = dir.as_ref();
        let paths = Self::definition_files(dir).await?;

        let mut definitions: Vec<T> = Vec::new();
        let mut seen_ids = HashSet::new();
        for path in paths {
            match Self::load_file::<T>(&path).await {
                Ok(definition) => {
                    if !seen_ids.insert(definition.id().to_owned()) {
                        tracing::warn!(
                            kind = T::KIND,
                            id = %definition.id(),
                            path = %path.display(),
                            "duplicate definition id, skipping"
                        );
                        continue;
                    }
                    definitions.push(definition);
                }
                Err(e) => {
                    tracing::warn!(
                        kind = T::KIND,
                        path = %path.display(),
                        error = %e,
                        "failed to load definition file, skipping"
                    );
                }
            }

            if definitions.len() > MAX_DEFINITIONS_COUNT {
                return Err(ProcessorError::DefinitionLoad {
                    path: dir.display().to_string(),
                    reason: format!("too many definitions: max {MAX_DEFINITIONS_COUNT}"),
                });
            }
        }

        tracing::info!(
            kind = T::KIND,
            dir = %dir.display(),
            count = definitions.len(),
            "loaded definitions"
        );

        Ok(definitions)
    }

    /// 디렉토리의 `.yml`/`.yaml` 파일 경로를 이름순으로 반환합니다.
    pub async fn definition_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ProcessorError> {
        let dir = dir.as_ref();
        let read_error = |e: std::io::Error| ProcessorError::DefinitionLoad {
            path: dir.display().to_string(),
            reason: format!("failed to read directory: {e}"),
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(read_error)?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                paths.push(path);
            }
        }
        // 디렉토리 순회 순서는 파일 시스템마다 다름
        paths.sort();
        Ok(paths)
    }

    /// 단일 YAML 파일에서 정의를 로드합니다.
    pub async fn load_file<T: Definition>(path: impl AsRef<Path>) -> Result<T, ProcessorError> {
        let path = path.as_ref();
        let content = read_bounded(path).await?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 파싱하고 검증합니다.
    pub fn parse_yaml<T: Definition>(yaml_str: &str, source: &str) -> Result<T, ProcessorError> {
        let definition: T =
            serde_yaml::from_str(yaml_str).map_err(|e| ProcessorError::DefinitionLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        definition.validate()?;

        Ok(definition)
    }

    /// 연결 파일(스트림별 연결 목록)을 로드합니다.
    ///
    /// 같은 스트림이 여러 번 나오면 뒤의 항목이 앞의 항목을 대체합니다.
    pub async fn load_connections(
        path: impl AsRef<Path>,
    ) -> Result<Vec<PipelineConnections>, ProcessorError> {
        let path = path.as_ref();
        let content = read_bounded(path).await?;
        let connections = Self::parse_connections(&content, &path.display().to_string())?;
        tracing::info!(
            path = %path.display(),
            count = connections.len(),
            "loaded pipeline connections"
        );
        Ok(connections)
    }

    /// 연결 YAML 문서를 파싱합니다. 빈 문서는 빈 목록입니다.
    pub fn parse_connections(
        yaml_str: &str,
        source: &str,
    ) -> Result<Vec<PipelineConnections>, ProcessorError> {
        if yaml_str.trim().is_empty() {
            return Ok(Vec::new());
        }
        let parsed: Vec<PipelineConnections> =
            serde_yaml::from_str(yaml_str).map_err(|e| ProcessorError::DefinitionLoad {
                path: source.to_owned(),
                reason: format!("YAML parse error: {e}"),
            })?;

        let mut connections: Vec<PipelineConnections> = Vec::with_capacity(parsed.len());
        for entry in parsed {
            entry.validate()?;
            let existing = connections
                .iter_mut()
                .find(|c| c.stream_id == entry.stream_id);
            match existing {
                Some(existing) => {
                    tracing::warn!(
                        stream_id = %entry.stream_id,
                        path = source,
                        "stream listed more than once, last entry wins"
                    );
                    *existing = entry;
                }
                None => connections.push(entry),
            }
        }
        Ok(connections)
    }
}

async fn read_bounded(path: &Path) -> Result<String, ProcessorError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ProcessorError::DefinitionLoad {
            path: path.display().to_string(),
            reason: format!("failed to read file metadata: {e}"),
        })?;

    if metadata.len() > MAX_DEFINITION_FILE_SIZE {
        return Err(ProcessorError::DefinitionLoad {
            path: path.display().to_string(),
            reason: format!(
                "file too large: {} bytes (max: {MAX_DEFINITION_FILE_SIZE})",
                metadata.len()
            ),
        });
    }

    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProcessorError::DefinitionLoad {
            path: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_rule() {
        let yaml = r#"
id: r1
title: Test Rule
when: { literal: true }
"#;
        let rule: Rule = DefinitionLoader::parse_yaml(yaml, "r1.yml").unwrap();
        assert_eq!(rule.id, "r1");
        assert!(rule.then.is_empty());
    }

    #[test]
    fn parse_invalid_yaml_returns_error() {
        let result: Result<Rule, _> = DefinitionLoader::parse_yaml("not: [valid: {{{", "bad.yml");
        assert!(matches!(result, Err(ProcessorError::DefinitionLoad { .. })));
    }

    #[test]
    fn parse_rule_with_empty_id_fails_validation() {
        let yaml = r#"
id: ""
title: t
when: { literal: true }
"#;
        let result: Result<Rule, _> = DefinitionLoader::parse_yaml(yaml, "empty.yml");
        assert!(matches!(result, Err(ProcessorError::Configuration(_))));
    }

    #[test]
    fn parse_pipeline_without_title_fails_validation() {
        let yaml = "id: p1\ntitle: \"\"\nstages: []\n";
        let result: Result<PipelineDefinition, _> = DefinitionLoader::parse_yaml(yaml, "p1.yml");
        assert!(matches!(result, Err(ProcessorError::Service(_))));
    }

    #[test]
    fn connections_last_entry_wins() {
        let yaml = r#"
- stream_id: s1
  pipeline_ids: [p1, p2]
- stream_id: s1
  pipeline_ids: [p3]
"#;
        let connections = DefinitionLoader::parse_connections(yaml, "c.yml").unwrap();
        assert_eq!(connections, vec![PipelineConnections::new("s1", ["p3"])]);
        assert!(DefinitionLoader::parse_connections("  \n", "c.yml").unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_nonexistent_directory_returns_error() {
        let result = DefinitionLoader::load_directory::<Rule>("/nonexistent/path/rules").await;
        assert!(result.is_err());
    }
}
