//! Run command - executes a workflow and prints the execution record

use std::time::Duration;

use clap::Args;
use tracing::{info, warn};

use super::WorkflowArgs;
use crate::domain::WorkflowExecution;
use crate::infrastructure::workflow::WorkflowOrchestrator;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arguments for the run command
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,

    /// Start in the background and report the execution id first;
    /// Ctrl-C cancels the execution
    #[arg(long)]
    pub detach: bool,
}

/// Run a workflow file
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = super::init();

    let workflow = super::load_workflow(&args.workflow.workflow)?;
    let input = super::parse_input(args.workflow.input.as_deref())?;
    let credentials = super::load_credentials(args.workflow.credentials.as_deref())?;
    let orchestrator = crate::create_orchestrator(&config, credentials)?;

    info!(workflow_id = %workflow.id, steps = workflow.steps.len(), "Running workflow");

    let execution = if args.detach {
        run_detached(&orchestrator, workflow, &input).await?
    } else {
        orchestrator.execute(&workflow, &input).await?
    };

    super::print_json(&execution)
}

async fn run_detached(
    orchestrator: &WorkflowOrchestrator,
    workflow: crate::domain::WorkflowDefinition,
    input: &serde_json::Map<String, serde_json::Value>,
) -> anyhow::Result<WorkflowExecution> {
    let execution_id = orchestrator.start_detached(workflow, input).await?;
    eprintln!("Execution started: {}", execution_id);

    let mut cancel_requested = false;

    loop {
        let execution = orchestrator.get(&execution_id).await?;
        if execution.status.is_terminal() {
            return Ok(execution);
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            result = tokio::signal::ctrl_c(), if !cancel_requested => {
                result?;
                cancel_requested = true;
                warn!(execution_id = %execution_id, "Interrupt received, cancelling execution");
                if let Err(e) = orchestrator.cancel(&execution_id).await {
                    warn!(execution_id = %execution_id, error = %e, "Cancellation failed");
                }
            }
        }
    }
}
