//! `ironpipe validate` command handler

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironpipe_pipeline_processor::{
    Definition, DefinitionLoader, FunctionRegistry, PipelineDefinition, ProcessorConfig,
    ProcessorState, Rule,
};

use crate::cli::ValidateArgs;
use crate::commands::{ResolvedPaths, load_config_or_default};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `validate` command.
pub async fn execute(
    args: ValidateArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config_or_default(config_path).await?;
    let processor_config = ProcessorConfig::from_core(&config.processor);
    let paths = ResolvedPaths::resolve(&args.paths, &processor_config);

    let report = validate(&paths).await?;
    writer.render(&report)?;

    let problems = report.file_errors.len() + report.excluded.len();
    if problems > 0 {
        return Err(CliError::Definition(format!(
            "{problems} definition problem(s) found"
        )));
    }
    Ok(())
}

/// Load every definition file individually and build a snapshot from the survivors.
pub async fn validate(paths: &ResolvedPaths) -> Result<ValidationReport, CliError> {
    info!(
        rules_dir = %paths.rules_dir.display(),
        pipelines_dir = %paths.pipelines_dir.display(),
        "validating definitions"
    );

    let mut file_errors = Vec::new();
    let rules: Vec<Rule> = load_each(&paths.rules_dir, &mut file_errors).await?;
    let pipelines: Vec<PipelineDefinition> =
        load_each(&paths.pipelines_dir, &mut file_errors).await?;

    let connections = if tokio::fs::try_exists(&paths.connections_file)
        .await
        .unwrap_or(false)
    {
        match DefinitionLoader::load_connections(&paths.connections_file).await {
            Ok(connections) => connections,
            Err(e) => {
                file_errors.push(FileError {
                    file: paths.connections_file.display().to_string(),
                    error: e.to_string(),
                });
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let registry = FunctionRegistry::builtin()?;
    let warnings = rules
        .iter()
        .filter_map(|rule| {
            rule.check_functions(&registry)
                .err()
                .map(|e| RuleWarning {
                    rule_id: rule.id.clone(),
                    warning: e.to_string(),
                })
        })
        .collect();

    let rules_loaded = rules.len();
    let pipelines_loaded = pipelines.len();
    let streams_connected = connections.len();
    let state = ProcessorState::build(rules, pipelines, connections, &registry, false);

    Ok(ValidationReport {
        rules_dir: paths.rules_dir.display().to_string(),
        pipelines_dir: paths.pipelines_dir.display().to_string(),
        connections_file: paths.connections_file.display().to_string(),
        rules_loaded,
        pipelines_loaded,
        streams_connected,
        active_pipelines: state.pipeline_count(),
        file_errors,
        excluded: state
            .excluded()
            .iter()
            .map(|e| ExcludedEntry {
                kind: e.kind.to_owned(),
                id: e.id.clone(),
                error: e.error.to_string(),
            })
            .collect(),
        warnings,
    })
}

async fn load_each<T: Definition>(
    dir: &Path,
    file_errors: &mut Vec<FileError>,
) -> Result<Vec<T>, CliError> {
    let mut seen = HashSet::new();
    let mut definitions = Vec::new();
    for path in DefinitionLoader::definition_files(dir).await? {
        let file = path.display().to_string();
        match DefinitionLoader::load_file::<T>(&path).await {
            Ok(definition) if !seen.insert(definition.id().to_owned()) => {
                file_errors.push(FileError {
                    file,
                    error: format!("duplicate {} id '{}'", T::KIND, definition.id()),
                });
            }
            Ok(definition) => definitions.push(definition),
            Err(e) => file_errors.push(FileError {
                file,
                error: e.to_string(),
            }),
        }
    }
    Ok(definitions)
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub rules_dir: String,
    pub pipelines_dir: String,
    pub connections_file: String,
    pub rules_loaded: usize,
    pub pipelines_loaded: usize,
    pub streams_connected: usize,
    pub active_pipelines: usize,
    pub file_errors: Vec<FileError>,
    pub excluded: Vec<ExcludedEntry>,
    pub warnings: Vec<RuleWarning>,
}

#[derive(Debug, Serialize)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ExcludedEntry {
    pub kind: String,
    pub id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RuleWarning {
    pub rule_id: String,
    pub warning: String,
}

impl Render for ValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Definition Validation")?;
        writeln!(w, "  Rules:       {} ({} loaded)", self.rules_dir.bold(), self.rules_loaded)?;
        writeln!(
            w,
            "  Pipelines:   {} ({} loaded, {} active)",
            self.pipelines_dir.bold(),
            self.pipelines_loaded,
            self.active_pipelines.to_string().green()
        )?;
        writeln!(
            w,
            "  Connections: {} ({} streams)",
            self.connections_file.bold(),
            self.streams_connected
        )?;

        if !self.file_errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "File errors:")?;
            for e in &self.file_errors {
                writeln!(w, "  {}: {}", e.file.red(), e.error)?;
            }
        }

        if !self.excluded.is_empty() {
            writeln!(w)?;
            writeln!(w, "Excluded from snapshot:")?;
            for e in &self.excluded {
                writeln!(w, "  {} {}: {}", e.kind, e.id.red(), e.error)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(w)?;
            writeln!(w, "Warnings (rule fails at evaluation):")?;
            for warning in &self.warnings {
                writeln!(w, "  {}: {}", warning.rule_id.yellow(), warning.warning)?;
            }
        }

        if self.file_errors.is_empty() && self.excluded.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "All definitions valid".green())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: &str = "id: r1\ntitle: rule one\nwhen: { literal: true }\n";
    const BROKEN_CALL: &str =
        "id: r2\ntitle: rule two\nwhen: { call: { function: no_such_function } }\n";
    const PIPELINE: &str = "id: p1\ntitle: main\nstages:\n  - stage: 0\n    rules: [r1]\n";
    const DANGLING: &str = "id: p2\ntitle: dangling\nstages:\n  - stage: 0\n    rules: [missing]\n";

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, ResolvedPaths) {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("rules")).expect("rules dir");
        std::fs::create_dir(dir.path().join("pipelines")).expect("pipelines dir");
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).expect("write file");
        }
        let paths = ResolvedPaths {
            rules_dir: dir.path().join("rules"),
            pipelines_dir: dir.path().join("pipelines"),
            connections_file: dir.path().join("connections.yml"),
        };
        (dir, paths)
    }

    #[tokio::test]
    async fn test_validate_clean_definitions() {
        let (_dir, paths) = setup(&[
            ("rules/r1.yml", RULE),
            ("pipelines/p1.yml", PIPELINE),
            ("connections.yml", "- stream_id: default\n  pipeline_ids: [p1]\n"),
        ]);
        let report = validate(&paths).await.expect("validation runs");
        assert_eq!(report.rules_loaded, 1);
        assert_eq!(report.active_pipelines, 1);
        assert_eq!(report.streams_connected, 1);
        assert!(report.file_errors.is_empty());
        assert!(report.excluded.is_empty());
    }

    #[tokio::test]
    async fn test_validate_reports_each_problem() {
        let (_dir, paths) = setup(&[
            ("rules/r1.yml", RULE),
            ("rules/r1-copy.yml", RULE),
            ("rules/r2.yml", BROKEN_CALL),
            ("rules/bad.yaml", "when: [unclosed"),
            ("pipelines/p1.yml", PIPELINE),
            ("pipelines/p2.yml", DANGLING),
        ]);
        let report = validate(&paths).await.expect("validation runs");

        assert_eq!(report.rules_loaded, 2);
        assert_eq!(report.file_errors.len(), 2, "duplicate id and broken yaml");
        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].id, "p2");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].rule_id, "r2");
        assert_eq!(report.active_pipelines, 1);
    }

    #[test]
    fn test_render_text_lists_problems() {
        let report = ValidationReport {
            rules_dir: "rules".to_owned(),
            pipelines_dir: "pipelines".to_owned(),
            connections_file: "connections.yml".to_owned(),
            rules_loaded: 0,
            pipelines_loaded: 1,
            streams_connected: 0,
            active_pipelines: 0,
            file_errors: Vec::new(),
            excluded: vec![ExcludedEntry {
                kind: "pipeline".to_owned(),
                id: "p2".to_owned(),
                error: "pipeline 'p2' references unknown rule 'missing'".to_owned(),
            }],
            warnings: Vec::new(),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.contains("Excluded from snapshot"));
        assert!(text.contains("unknown rule 'missing'"));
        assert!(!text.contains("All definitions valid"));
    }
}
