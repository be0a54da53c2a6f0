//! `ironpipe process` command handler

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::info;

use ironpipe_core::message::Message;
use ironpipe_pipeline_processor::{
    FunctionRegistry, MessageProcessor, PipelineInterpreter, ProcessorConfig, ProcessorState,
    StateHandle,
};

use crate::cli::ProcessArgs;
use crate::commands::{Definitions, ResolvedPaths, load_config_or_default};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `process` command.
pub async fn execute(
    args: ProcessArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_config_or_default(config_path).await?;
    let processor_config = ProcessorConfig::from_core(&config.processor);
    let paths = ResolvedPaths::resolve(&args.paths, &processor_config);

    let input = if args.reads_stdin() {
        let mut buffer = String::new();
        tokio::io::stdin().read_to_string(&mut buffer).await?;
        buffer
    } else {
        tokio::fs::read_to_string(&args.input).await?
    };
    let messages = parse_messages(&input)?;

    let definitions = Definitions::load(&paths).await?;
    let registry = Arc::new(FunctionRegistry::builtin()?);
    let state = ProcessorState::build(
        definitions.rules,
        definitions.pipelines,
        definitions.connections,
        &registry,
        false,
    );
    let interpreter = PipelineInterpreter::new(
        registry,
        Arc::new(StateHandle::new(state)),
        processor_config.max_stream_rounds,
    );

    let report = if args.pipelines.is_empty() {
        run_connected(&interpreter, messages)
    } else {
        run_simulation(&interpreter, messages, &args.pipelines)?
    };
    writer.render(&report)
}

/// Parse newline-delimited JSON messages. Blank lines are ignored.
pub fn parse_messages(input: &str) -> Result<Vec<Message>, CliError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Message>(line)
                .map_err(|e| CliError::Input(format!("line {}: {e}", index + 1)))
        })
        .collect()
}

/// Route messages through their streams' connected pipelines.
pub fn run_connected(interpreter: &PipelineInterpreter, messages: Vec<Message>) -> ProcessReport {
    let input = messages.len();
    info!(messages = input, "processing messages");
    let output = interpreter.process(messages);
    ProcessReport {
        mode: "connections",
        input,
        output: output.len(),
        messages: output,
    }
}

/// Run every message through the named pipelines only, keeping dropped messages
/// in the output so their filter flag is visible.
pub fn run_simulation(
    interpreter: &PipelineInterpreter,
    messages: Vec<Message>,
    pipeline_ids: &[String],
) -> Result<ProcessReport, CliError> {
    let state = interpreter.state().current();
    if let Some(unknown) = pipeline_ids.iter().find(|id| state.pipeline(id).is_none()) {
        return Err(CliError::Command(format!(
            "pipeline '{unknown}' is not active (missing or excluded)"
        )));
    }
    let ids: BTreeSet<String> = pipeline_ids.iter().cloned().collect();

    let input = messages.len();
    info!(messages = input, pipelines = ids.len(), "simulating pipelines");
    let output: Vec<Message> = messages
        .into_iter()
        .flat_map(|message| interpreter.process_for_pipelines(message, &ids, &state))
        .collect();

    Ok(ProcessReport {
        mode: "simulation",
        input,
        output: output.len(),
        messages: output,
    })
}

#[derive(Debug, Serialize)]
pub struct ProcessReport {
    pub mode: &'static str,
    pub input: usize,
    pub output: usize,
    pub messages: Vec<Message>,
}

impl Render for ProcessReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Processed {} message(s) -> {} output ({})",
            self.input.to_string().bold(),
            self.output.to_string().bold(),
            self.mode
        )?;

        for message in &self.messages {
            writeln!(w)?;
            let dropped = if message.filter_out() {
                " dropped".red()
            } else {
                "".normal()
            };
            writeln!(w, "{}{}", message.id().bold(), dropped)?;

            if !message.streams().is_empty() {
                let streams: Vec<&str> = message.streams().iter().map(String::as_str).collect();
                writeln!(w, "  streams: {}", streams.join(", "))?;
            }
            for (name, value) in message.fields() {
                writeln!(w, "  {} = {}", name.cyan(), value.to_json())?;
            }
            for error in message.processing_errors() {
                writeln!(w, "  {} {}: {}", "error".red(), error.message, error.details)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironpipe_core::types::Value;
    use ironpipe_pipeline_processor::{
        Expression, FunctionCall, MatchPolicy, PipelineConnections, PipelineDefinition, Rule,
        Statement,
    };

    fn interpreter() -> PipelineInterpreter {
        let registry = Arc::new(FunctionRegistry::builtin().expect("registry"));
        let rules = vec![
            Rule::new("tag", "tag", Expression::literal(true)).then(Statement::call(
                FunctionCall::new("set_field")
                    .arg("field", Expression::literal("tagged"))
                    .arg("value", Expression::literal(true)),
            )),
            Rule::new("drop", "drop", Expression::literal(true))
                .then(Statement::call(FunctionCall::new("drop_message"))),
        ];
        let pipelines = vec![
            PipelineDefinition::new("tagger", "tagger").stage(0, MatchPolicy::All, ["tag"]),
            PipelineDefinition::new("dropper", "dropper").stage(0, MatchPolicy::All, ["drop"]),
        ];
        let connections = vec![PipelineConnections::new("default", ["tagger"])];
        let state = ProcessorState::build(rules, pipelines, connections, &registry, false);
        PipelineInterpreter::new(registry, Arc::new(StateHandle::new(state)), 4)
    }

    #[test]
    fn test_parse_messages_skips_blank_lines() {
        let input = "{\"id\":\"a\",\"fields\":{\"n\":1}}\n\n{\"fields\":{}}\n";
        let messages = parse_messages(input).expect("parse");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id(), "a");
        assert_eq!(messages[0].field("n"), Some(&Value::Long(1)));
        assert!(!messages[1].id().is_empty(), "missing id gets generated");
    }

    #[test]
    fn test_parse_messages_reports_line_number() {
        let err = parse_messages("{\"id\":\"a\"}\nnot json\n").expect_err("bad line");
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_run_connected_uses_default_stream() {
        let report = run_connected(&interpreter(), vec![Message::with_id("m1")]);
        assert_eq!(report.mode, "connections");
        assert_eq!(report.output, 1);
        assert_eq!(
            report.messages[0].field("tagged"),
            Some(&Value::Boolean(true))
        );
    }

    #[test]
    fn test_run_simulation_keeps_dropped_messages() {
        let report = run_simulation(
            &interpreter(),
            vec![Message::with_id("m1")],
            &["dropper".to_owned()],
        )
        .expect("simulation");
        assert_eq!(report.output, 1);
        assert!(report.messages[0].filter_out());
        assert!(!report.messages[0].has_field("tagged"));
    }

    #[test]
    fn test_run_simulation_rejects_unknown_pipeline() {
        let err = run_simulation(&interpreter(), Vec::new(), &["ghost".to_owned()])
            .expect_err("unknown pipeline");
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_render_text_marks_dropped() {
        let mut message = Message::with_id("m1").with_field("level", "warn");
        message.set_filter_out(true);
        let report = ProcessReport {
            mode: "simulation",
            input: 1,
            output: 1,
            messages: vec![message],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.contains("dropped"));
        assert!(text.contains("\"warn\""));
    }
}
