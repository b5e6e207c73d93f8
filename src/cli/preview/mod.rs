//! Preview command - dry-runs a workflow and prints the preview result

use clap::Args;
use tracing::info;

use super::WorkflowArgs;

/// Arguments for the preview command
#[derive(Args, Clone, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub workflow: WorkflowArgs,
}

/// Preview a workflow file
pub async fn run(args: PreviewArgs) -> anyhow::Result<()> {
    let config = super::init();

    let workflow = super::load_workflow(&args.workflow.workflow)?;
    let input = super::parse_input(args.workflow.input.as_deref())?;
    let credentials = super::load_credentials(args.workflow.credentials.as_deref())?;
    let orchestrator = crate::create_orchestrator(&config, credentials)?;

    info!(workflow_id = %workflow.id, "Previewing workflow");

    let result = orchestrator.preview(&workflow, &input).await?;
    super::print_json(&result)
}
