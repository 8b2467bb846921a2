use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nodeflow_core::event::{ExecuteWorkflowEvent, EXECUTE_WORKFLOW_EVENT};
use nodeflow_core::{ExecutionMode, ExecutionStatus, OutputData, WorkflowId};
use std::path::{Path, PathBuf};

mod config;

use config::WorkerConfig;

#[derive(Parser, Debug)]
#[command(name = "nodeflow")]
#[command(about = "Durable runner for node-based workflow graphs", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nodeflow.toml")]
    config: PathBuf,

    /// Data directory for workflows and step memos
    #[arg(short, long, default_value = "./data", env = "NODEFLOW_DATA_DIR")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a stored workflow by id
    Run {
        #[arg(long)]
        workflow_id: String,

        /// Resume or name the execution; generated when absent
        #[arg(long)]
        execution_id: Option<String>,

        /// Initial input as a JSON object
        #[arg(long)]
        input: Option<String>,
    },
    /// Handle a workflows/execute.workflow event read from a JSON file
    Event { path: PathBuf },
    /// Print the execution order of a workflow without running it
    Plan {
        #[arg(long)]
        workflow_id: String,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nodeflow=info,nodeflow_core=info".into());

    // Logs go to stderr so stdout stays machine-readable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_input(raw: Option<&str>) -> Result<Option<OutputData>> {
    raw.map(|raw| serde_json::from_str(raw).context("--input must be a JSON object"))
        .transpose()
}

fn read_event(path: &Path) -> Result<ExecuteWorkflowEvent> {
    let content = std::fs::read_to_string(path).context("Failed to read event file")?;
    let event: ExecuteWorkflowEvent =
        serde_json::from_str(&content).context("Failed to parse event file")?;

    if event.name != EXECUTE_WORKFLOW_EVENT {
        bail!(
            "Unsupported event {:?}, expected {:?}",
            event.name,
            EXECUTE_WORKFLOW_EVENT
        );
    }

    Ok(event)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    tracing::info!("Data directory: {}", args.data_dir.display());

    // Load configuration
    let config = WorkerConfig::load(&args.config, args.data_dir)?;
    let runner = config.build_runner()?;

    let (event, mode) = match args.command {
        Command::Plan { workflow_id } => {
            let nodes = runner.plan(&WorkflowId::new(workflow_id)).await?;
            println!("{}", serde_json::to_string_pretty(&nodes)?);
            return Ok(());
        }
        Command::Run {
            workflow_id,
            execution_id,
            input,
        } => {
            let mut event = ExecuteWorkflowEvent::new(workflow_id);
            event.data.execution_id = execution_id.map(Into::into);
            event.data.initial_data = parse_input(input.as_deref())?;
            (event, ExecutionMode::Manual)
        }
        Command::Event { path } => (read_event(&path)?, ExecutionMode::Triggered),
    };

    let execution = runner.execute_tracked(&event, mode).await?;
    println!("{}", serde_json::to_string_pretty(&execution)?);

    if execution.status == ExecutionStatus::Failed {
        bail!(
            "Execution {} failed: {}",
            execution.id,
            execution.error.unwrap_or_default()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_input() {
        assert!(parse_input(None).unwrap().is_none());
        let data = parse_input(Some(r#"{"user":"ada"}"#)).unwrap().unwrap();
        assert_eq!(data["user"], "ada");
        assert!(parse_input(Some("[1,2]")).is_err());
    }

    #[test]
    fn test_read_event_rejects_other_names() {
        let dir = TempDir::new().unwrap();

        let good = dir.path().join("good.json");
        std::fs::write(
            &good,
            r#"{"name":"workflows/execute.workflow","data":{"workflowId":"wf"}}"#,
        )
        .unwrap();
        let event = read_event(&good).unwrap();
        assert_eq!(event.workflow_id().unwrap().as_str(), "wf");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"name":"workflows/delete","data":{}}"#).unwrap();
        assert!(read_event(&bad).is_err());
    }
}
