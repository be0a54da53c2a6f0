//! CLI-specific error types and exit code mapping

use ironpipe_core::error::IronpipeError;
use ironpipe_pipeline_processor::ProcessorError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Rule, pipeline or connection definitions are broken.
    #[error("definition error: {0}")]
    Definition(String),

    /// An input message could not be decoded.
    #[error("input error: {0}")]
    Input(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from ironpipe-core.
    #[error("{0}")]
    Core(#[from] IronpipeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                      |
    /// |------|------------------------------|
    /// | 0    | Success                      |
    /// | 1    | General / command error      |
    /// | 2    | Configuration error          |
    /// | 3    | Broken definitions           |
    /// | 4    | Malformed input message      |
    /// | 10   | IO error                     |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Core(IronpipeError::Config(_)) => 2,
            Self::Definition(_) => 3,
            Self::Input(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<ProcessorError> for CliError {
    fn from(e: ProcessorError) -> Self {
        match e {
            ProcessorError::Config { .. } => Self::Config(e.to_string()),
            other => Self::Definition(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironpipe_core::error::ConfigError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("bad".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = IronpipeError::Config(ConfigError::FileNotFound {
            path: "ironpipe.toml".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2, "core config errors keep exit code 2");
    }

    #[test]
    fn test_exit_code_definition_error() {
        let err = CliError::Definition("2 definitions excluded".to_owned());
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("definition error"));
    }

    #[test]
    fn test_exit_code_input_error() {
        let err = CliError::Input("line 3: expected value".to_owned());
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("unknown function: nope".to_owned());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "unknown function: nope");
    }

    #[test]
    fn test_from_processor_config_error() {
        let err: CliError = ProcessorError::Config {
            field: "worker_count".to_owned(),
            reason: "must be 1-64".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_from_processor_load_error() {
        let err: CliError = ProcessorError::DefinitionLoad {
            path: "rules/a.yml".to_owned(),
            reason: "invalid YAML".to_owned(),
        }
        .into();
        assert!(matches!(err, CliError::Definition(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
