//! Logs command - Show recent deployment audit entries

use clap::Args;
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;
use crate::output::{print_json, truncate};

/// Arguments for the logs command
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Maximum number of entries, newest first
    #[arg(
        long,
        short = 'n',
        default_value_t = 20,
        value_parser = clap::value_parser!(u16).range(1..=1000)
    )]
    pub limit: u16,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the logs command
pub async fn execute(args: LogsArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::open(global).await?;
    let connector = ctx.connector(global).await?;

    let entries = connector.recent_logs(usize::from(args.limit)).await?;
    if args.json {
        print_json(&entries)?;
        return Ok(ExitCode::SUCCESS);
    }

    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(ExitCode::SUCCESS);
    }

    for entry in &entries {
        println!(
            "{}  {:<15} {:<7} {:<24} {:>6}ms  {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.operation.as_str(),
            entry.status.as_str(),
            truncate(entry.rule_name.as_deref().unwrap_or("-"), 24),
            entry.execution_time_ms,
            entry.message
        );
    }

    Ok(ExitCode::SUCCESS)
}
