//! Deploy command - Create or update a disclaimer rule from a JSON file

use anyhow::Context;
use clap::Args;
use sigflow_connector_exchange::RuleSpec;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;

/// Arguments for the deploy command
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Rule specification file (JSON, camelCase fields)
    pub file: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Reads a rule specification file.
pub fn load_spec(path: &Path) -> anyhow::Result<RuleSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a valid rule", path.display()))
}

/// Execute the deploy command
pub async fn execute(args: DeployArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let spec = load_spec(&args.file)?;
    let ctx = AppContext::open(global).await?;
    let connector = ctx.connector(global).await?;

    let result = connector.deploy(&spec).await;
    super::report(&result, args.json)
}
