//! Status command - Show tracked deployment records

use clap::Args;
use sigflow_db::DeploymentRecord;
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;
use crate::output::{print_json, print_key_value, print_warning, truncate};

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show one rule, including any pending script
    pub name: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn pending_count(records: &[DeploymentRecord]) -> usize {
    records.iter().filter(|r| r.status.is_pending()).count()
}

/// Execute the status command
pub async fn execute(args: StatusArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::open(global).await?;
    let connector = ctx.connector(global).await?;

    if let Some(name) = &args.name {
        let Some(record) = connector.deployment(name).await? else {
            print_warning(&format!("No deployment record for rule '{name}'"));
            return Ok(ExitCode::FAILURE);
        };

        if args.json {
            print_json(&record)?;
            return Ok(ExitCode::SUCCESS);
        }

        print_key_value("Rule", &record.rule_name);
        print_key_value("Status", record.status.as_str());
        print_key_value(
            "Remote id",
            record.remote_rule_id.as_deref().unwrap_or("-"),
        );
        print_key_value("Content hash", &record.content_hash);
        print_key_value("Version", &record.version.to_string());
        print_key_value("Last deployed", &record.last_deployed_at.to_rfc3339());
        if record.status.is_pending() {
            print_warning("Waiting for an administrator to run the script below");
        }
        if let Some(script) = &record.script_text {
            println!();
            println!("{script}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let records = connector.deployments().await?;
    if args.json {
        print_json(&records)?;
        return Ok(ExitCode::SUCCESS);
    }

    if records.is_empty() {
        println!("No deployment records.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{:<32} {:<26} {:<38} {:>7}",
        "RULE", "STATUS", "REMOTE ID", "VERSION"
    );
    for record in &records {
        println!(
            "{:<32} {:<26} {:<38} {:>7}",
            truncate(&record.rule_name, 32),
            record.status.as_str(),
            record.remote_rule_id.as_deref().unwrap_or("-"),
            record.version
        );
    }

    let pending = pending_count(&records);
    if pending > 0 {
        println!();
        print_warning(&format!(
            "{pending} rule(s) wait for manual script execution; \
             run `sigflow status <NAME>` to view a script"
        ));
    }

    Ok(ExitCode::SUCCESS)
}
