//! `ironpipe functions` command handler

use std::io::Write;

use serde::Serialize;

use ironpipe_pipeline_processor::{FunctionDescriptor, FunctionRegistry};

use crate::cli::FunctionsArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `functions` command.
pub fn execute(args: FunctionsArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let registry = FunctionRegistry::builtin()?;
    let report = build_report(&registry, args.name.as_deref())?;
    writer.render(&report)
}

pub fn build_report(
    registry: &FunctionRegistry,
    name: Option<&str>,
) -> Result<FunctionListReport, CliError> {
    let functions: Vec<FunctionEntry> = match name {
        Some(name) => {
            let descriptor = registry
                .descriptors()
                .into_iter()
                .find(|d| d.name() == name)
                .ok_or_else(|| CliError::Command(format!("unknown function: {name}")))?;
            vec![FunctionEntry::from(descriptor)]
        }
        None => registry
            .descriptors()
            .into_iter()
            .map(FunctionEntry::from)
            .collect(),
    };

    Ok(FunctionListReport {
        total: functions.len(),
        functions,
    })
}

#[derive(Debug, Serialize)]
pub struct FunctionListReport {
    pub total: usize,
    pub functions: Vec<FunctionEntry>,
}

#[derive(Debug, Serialize)]
pub struct FunctionEntry {
    pub name: String,
    pub return_type: String,
    pub pure: bool,
    pub params: Vec<ParamEntry>,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ParamEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub optional: bool,
}

impl From<&FunctionDescriptor> for FunctionEntry {
    fn from(descriptor: &FunctionDescriptor) -> Self {
        Self {
            name: descriptor.name().to_owned(),
            return_type: descriptor.return_type().name().to_owned(),
            pure: descriptor.is_pure(),
            params: descriptor
                .params()
                .iter()
                .map(|p| ParamEntry {
                    name: p.name().to_owned(),
                    value_type: p.value_type().name().to_owned(),
                    optional: p.is_optional(),
                })
                .collect(),
            description: descriptor.description().to_owned(),
        }
    }
}

impl FunctionEntry {
    fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let marker = if p.optional { "?" } else { "" };
                format!("{}{marker}: {}", p.name, p.value_type)
            })
            .collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.return_type)
    }
}

impl Render for FunctionListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Functions ({} total)", self.total.to_string().bold())?;
        writeln!(w)?;
        for f in &self.functions {
            let purity = if f.pure {
                " [pure]".dimmed()
            } else {
                "".normal()
            };
            writeln!(w, "{}{}", f.signature().bold(), purity)?;
            if !f.description.is_empty() {
                writeln!(w, "    {}", f.description)?;
            }
        }
        Ok(())
    }
}
