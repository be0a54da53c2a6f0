//! `ironpipe config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironpipe_core::config::IronpipeConfig;
use ironpipe_pipeline_processor::ProcessorConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load the file, apply env overrides, and run both the core and the
/// processor-level validation.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match IronpipeConfig::load(config_path).await {
        Ok(config) => match ProcessorConfig::from_core(&config.processor).validate() {
            Ok(()) => Vec::new(),
            Err(e) => vec![e.to_string()],
        },
        Err(e) => vec![e.to_string()],
    };

    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    };
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = IronpipeConfig::load(config_path).await?;
    let report = show_report(&config, config_path, section.as_deref())?;
    writer.render(&report)
}

pub fn show_report(
    config: &IronpipeConfig,
    config_path: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    let config_toml = match section {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("processor") => toml::to_string_pretty(&config.processor),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, processor)"
            )));
        }
    }
    .unwrap_or_else(|e| format!("(serialization error: {e})"));

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    pub section: Option<String>,
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(w, "# {} [{}]", self.source.bold(), section)?,
            None => writeln!(w, "# {}", self.source.bold())?,
        }
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.valid {
            writeln!(w, "{} {}", "valid".green(), self.source)?;
        } else {
            writeln!(w, "{} {}", "invalid".red(), self.source)?;
            for e in &self.errors {
                writeln!(w, "  - {e}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_report_full_config() {
        let config = IronpipeConfig::default();
        let report = show_report(&config, Path::new("ironpipe.toml"), None).expect("report");
        assert!(report.section.is_none());
        assert!(report.config_toml.contains("[general]"));
        assert!(report.config_toml.contains("[processor]"));
    }

    #[test]
    fn test_show_report_processor_section() {
        let config = IronpipeConfig::default();
        let report =
            show_report(&config, Path::new("ironpipe.toml"), Some("processor")).expect("report");
        assert_eq!(report.section.as_deref(), Some("processor"));
        assert!(report.config_toml.contains("max_stream_rounds = 16"));
        assert!(!report.config_toml.contains("log_format"));
    }

    #[test]
    fn test_show_report_unknown_section() {
        let config = IronpipeConfig::default();
        let err = show_report(&config, Path::new("ironpipe.toml"), Some("ebpf"))
            .expect_err("unknown section");
        assert!(err.to_string().contains("unknown section: ebpf"));
    }

    #[test]
    fn test_validation_report_render_invalid() {
        let report = ConfigValidationReport {
            source: "ironpipe.toml".to_owned(),
            valid: false,
            errors: vec!["invalid config value for 'worker_count'".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.contains("invalid"));
        assert!(text.contains("worker_count"));
    }

    #[test]
    fn test_validation_report_json() {
        let report = ConfigValidationReport {
            source: "ironpipe.toml".to_owned(),
            valid: true,
            errors: Vec::new(),
        };
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["valid"], serde_json::Value::Bool(true));
        assert_eq!(json["errors"].as_array().map(Vec::len), Some(0));
    }
}
