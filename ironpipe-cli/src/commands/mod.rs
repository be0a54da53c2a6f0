//! Command handlers -- one module per subcommand

pub mod config;
pub mod functions;
pub mod process;
pub mod validate;

use std::path::{Path, PathBuf};

use ironpipe_core::config::IronpipeConfig;
use ironpipe_core::error::{ConfigError, IronpipeError};
use ironpipe_pipeline_processor::{
    DefinitionLoader, PipelineConnections, PipelineDefinition, ProcessorConfig, Rule,
};

use crate::cli::DefinitionPaths;
use crate::error::CliError;

/// Load the configuration file, falling back to defaults when it does not exist.
///
/// Environment overrides apply in both cases.
pub async fn load_config_or_default(path: &Path) -> Result<IronpipeConfig, CliError> {
    match IronpipeConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(IronpipeError::Config(ConfigError::FileNotFound { .. })) => {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            let mut config = IronpipeConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

/// Definition file locations after applying command-line overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub rules_dir: PathBuf,
    pub pipelines_dir: PathBuf,
    pub connections_file: PathBuf,
}

impl ResolvedPaths {
    pub fn resolve(overrides: &DefinitionPaths, config: &ProcessorConfig) -> Self {
        Self {
            rules_dir: overrides
                .rules_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.rules_dir)),
            pipelines_dir: overrides
                .pipelines_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.pipelines_dir)),
            connections_file: overrides
                .connections_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.connections_file)),
        }
    }
}

/// Raw definitions as read from disk, before snapshot building.
#[derive(Debug, Default)]
pub struct Definitions {
    pub rules: Vec<Rule>,
    pub pipelines: Vec<PipelineDefinition>,
    pub connections: Vec<PipelineConnections>,
}

impl Definitions {
    /// Read all three definition sources.
    ///
    /// A missing connections file yields no connections; missing
    /// definition directories are errors.
    pub async fn load(paths: &ResolvedPaths) -> Result<Self, CliError> {
        let rules = DefinitionLoader::load_directory::<Rule>(&paths.rules_dir).await?;
        let pipelines =
            DefinitionLoader::load_directory::<PipelineDefinition>(&paths.pipelines_dir).await?;
        let connections = if tokio::fs::try_exists(&paths.connections_file)
            .await
            .unwrap_or(false)
        {
            DefinitionLoader::load_connections(&paths.connections_file).await?
        } else {
            tracing::warn!(
                path = %paths.connections_file.display(),
                "connections file not found, no streams are connected"
            );
            Vec::new()
        };

        Ok(Self {
            rules,
            pipelines,
            connections,
        })
    }
}
