//! CLI command implementations

pub mod configure;
pub mod deploy;
pub mod logs;
pub mod remove;
pub mod script;
pub mod status;
pub mod test;

use sigflow_connector_exchange::DeploymentResult;
use std::process::ExitCode;

use crate::output::{print_failure, print_json, print_success, print_warning};

/// Prints a deploy or remove outcome and maps it to the exit code.
pub(crate) fn report(result: &DeploymentResult, json: bool) -> anyhow::Result<ExitCode> {
    if json {
        print_json(result)?;
    } else if result.success {
        print_success(&result.message);
    } else {
        print_failure(&result.message);
        for error in result.errors.iter().flatten() {
            print_warning(error);
        }
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
