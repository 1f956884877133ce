//! Remove command - Delete a disclaimer rule by name

use clap::Args;
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;

/// Arguments for the remove command
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Exact (case-sensitive) rule name
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the remove command
pub async fn execute(args: RemoveArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::open(global).await?;
    let connector = ctx.connector(global).await?;

    let result = connector.remove(&args.name).await;
    super::report(&result, args.json)
}
