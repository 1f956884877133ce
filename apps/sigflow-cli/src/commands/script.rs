//! Script command - Render the administrator script for a rule

use anyhow::Context;
use clap::{Args, ValueEnum};
use sigflow_connector_exchange::ScriptOperation;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::GlobalArgs;
use crate::context::AppContext;
use crate::output::print_success;

/// Script operation selectable on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationArg {
    Create,
    Update,
    Delete,
}

impl From<OperationArg> for ScriptOperation {
    fn from(op: OperationArg) -> Self {
        match op {
            OperationArg::Create => ScriptOperation::Create,
            OperationArg::Update => ScriptOperation::Update,
            OperationArg::Delete => ScriptOperation::Delete,
        }
    }
}

/// Arguments for the script command
#[derive(Args, Debug)]
pub struct ScriptArgs {
    /// Rule specification file (JSON, camelCase fields)
    pub file: PathBuf,

    /// Operation the script performs
    #[arg(long, value_enum, default_value = "create")]
    pub operation: OperationArg,

    /// Write the script to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Execute the script command
pub async fn execute(args: ScriptArgs, global: &GlobalArgs) -> anyhow::Result<ExitCode> {
    let spec = super::deploy::load_spec(&args.file)?;
    let ctx = AppContext::open(global).await?;
    let connector = ctx.connector(global).await?;

    let generated = connector
        .generate_script(&spec, args.operation.into())
        .await?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &generated.script_text)
                .with_context(|| format!("cannot write {}", path.display()))?;
            print_success(&format!(
                "Script written to {} (record status: {})",
                path.display(),
                generated.record_status
            ));
        }
        None => print!("{}", generated.script_text),
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_maps_to_script_operation() {
        assert_eq!(
            ScriptOperation::from(OperationArg::Delete),
            ScriptOperation::Delete
        );
        assert_eq!(
            ScriptOperation::from(OperationArg::Update),
            ScriptOperation::Update
        );
    }
}
