//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ironpipe -- pipeline rule processing engine.
///
/// Use `ironpipe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironpipe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironpipe.toml configuration file.
    #[arg(short, long, default_value = "ironpipe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load rule, pipeline and connection definitions and report problems.
    Validate(ValidateArgs),

    /// List the built-in function library.
    Functions(FunctionsArgs),

    /// Run JSON messages through the configured pipelines.
    Process(ProcessArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- validate ----

/// Directory overrides shared by `validate` and `process`.
#[derive(Args, Debug, Default, Clone)]
pub struct DefinitionPaths {
    /// Rule definitions directory (default: `[processor] rules_dir`).
    #[arg(long)]
    pub rules_dir: Option<PathBuf>,

    /// Pipeline definitions directory (default: `[processor] pipelines_dir`).
    #[arg(long)]
    pub pipelines_dir: Option<PathBuf>,

    /// Stream connections file (default: `[processor] connections_file`).
    #[arg(long)]
    pub connections_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub paths: DefinitionPaths,
}

// ---- functions ----

#[derive(Args, Debug)]
pub struct FunctionsArgs {
    /// Show only the named function.
    pub name: Option<String>,
}

// ---- process ----

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// File with one JSON message per line (`-` reads stdin).
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Run only these pipelines, ignoring stream connections. Repeatable.
    #[arg(short, long = "pipeline")]
    pub pipelines: Vec<String>,

    #[command(flatten)]
    pub paths: DefinitionPaths,
}

impl ProcessArgs {
    /// Whether input comes from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, processor).
        #[arg(long)]
        section: Option<String>,
    },
}
