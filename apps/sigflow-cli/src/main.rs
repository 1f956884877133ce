//! sigflow CLI - deploy email-signature disclaimer rules into tenant mail systems
//!
//! Operators use it to:
//! - Verify a tenant's directory credentials
//! - Deploy or remove a disclaimer rule
//! - Render the administrator script for manual execution
//! - Inspect deployment records and the audit trail

use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;
mod config;
mod context;
mod logging;
mod output;

use config::GlobalArgs;
use logging::LogFormat;

/// sigflow - email-signature rule deployment
#[derive(Parser)]
#[command(name = "sigflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Test the tenant's connection to the directory
    Test(commands::test::TestArgs),

    /// Create or update a disclaimer rule from a JSON file
    Deploy(commands::deploy::DeployArgs),

    /// Remove a disclaimer rule by name
    Remove(commands::remove::RemoveArgs),

    /// Render the administrator script for a rule
    Script(commands::script::ScriptArgs),

    /// Show tracked deployment records
    Status(commands::status::StatusArgs),

    /// Show recent deployment audit entries
    Logs(commands::logs::LogsArgs),

    /// Store or update the tenant's connector settings (needs DATABASE_URL)
    Configure(commands::configure::ConfigureArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let format = LogFormat::from_env_str(
        &std::env::var("SIGFLOW_LOG_FORMAT").unwrap_or_default(),
    );
    if let Err(e) = logging::init_logging("info", format) {
        eprintln!("Error: failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_failure(&format!("{e:#}"));
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let global = &cli.global;
    match cli.command {
        Commands::Test(args) => commands::test::execute(args, global).await,
        Commands::Deploy(args) => commands::deploy::execute(args, global).await,
        Commands::Remove(args) => commands::remove::execute(args, global).await,
        Commands::Script(args) => commands::script::execute(args, global).await,
        Commands::Status(args) => commands::status::execute(args, global).await,
        Commands::Logs(args) => commands::logs::execute(args, global).await,
        Commands::Configure(args) => commands::configure::execute(args, global).await,
    }
}
