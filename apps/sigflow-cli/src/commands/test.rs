//! Test command - Verify the tenant's credentials and directory access

use clap::Args;
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;
use crate::output::{print_failure, print_json, print_key_value, print_success};

/// Arguments for the test command
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the test command
pub async fn execute(args: TestArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let ctx = AppContext::open(global).await?;
    let connector = ctx.connector(global).await?;

    let result = connector.test_connection().await;

    if args.json {
        print_json(&result)?;
    } else if result.success {
        print_success(&result.message);
        if let Some(details) = result.details.as_ref().and_then(|d| d.as_object()) {
            for (key, value) in details {
                print_key_value(key, value.as_str().unwrap_or_default());
            }
        }
    } else {
        print_failure(&result.message);
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
