//! CLI module for the promptflow engine
//!
//! Provides subcommands for running workflow definition files:
//! - `run`: live execution tracked as an execution record
//! - `preview`: dry run with sample inputs, nothing persisted

pub mod preview;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::domain::{CredentialResolver, WorkflowDefinition};
use crate::infrastructure::credentials::StaticCredentialResolver;
use crate::infrastructure::logging;

/// Promptflow - run prompt workflows across multiple LLM providers
#[derive(Parser)]
#[command(name = "promptflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a workflow and print the execution record
    Run(run::RunArgs),

    /// Preview a workflow without recording an execution
    Preview(preview::PreviewArgs),
}

/// Arguments shared by every command
#[derive(Args, Clone, Debug)]
pub struct WorkflowArgs {
    /// Workflow definition file (JSON)
    pub workflow: PathBuf,

    /// Input variables as a JSON object, or `@path` to read them from a file
    #[arg(long)]
    pub input: Option<String>,

    /// Credential records file (JSON array); process defaults apply otherwise
    #[arg(long)]
    pub credentials: Option<PathBuf>,
}

/// Load configuration and install logging
pub(crate) fn init() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);
    config
}

pub(crate) fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {}", path.display()))?;

    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid workflow definition in {}", path.display()))
}

pub(crate) fn parse_input(input: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let Some(input) = input else {
        return Ok(Map::new());
    };

    let raw = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path))?,
        None => input.to_string(),
    };

    match serde_json::from_str(&raw).context("Input must be valid JSON")? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => anyhow::bail!("Input must be a JSON object, got {}", other),
    }
}

pub(crate) fn load_credentials(path: Option<&Path>) -> anyhow::Result<Arc<dyn CredentialResolver>> {
    let resolver = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
            StaticCredentialResolver::from_json(&raw)?
        }
        None => StaticCredentialResolver::default(),
    };

    Ok(Arc::new(resolver))
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
