//! Tenzir Platform CLI
//!
#![doc = "Main entry point for the Tenzir Platform CLI."]

use anyhow::{Context, Result};
use colored::Colorize;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tenzir_platform::cli::{AdminCommand, AuthCommand, Cli, Commands, NodeCommand, WorkspaceCommand};
use tenzir_platform::commands;
use tenzir_platform::config::PlatformEnvironment;
use tenzir_platform::error::PlatformError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse_args();

    let config = match PlatformEnvironment::from_env()
        .context("while parsing the configuration environment variables")
    {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            report(&e, false);
            std::process::exit(1);
        }
    };

    init_tracing(config.verbose);

    if let Err(e) = run(cli, &config).await {
        report(&e, config.verbose);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &PlatformEnvironment) -> Result<()> {
    match cli.command {
        Commands::Auth { command } => {
            let interactive = command.interactive();
            match command {
                AuthCommand::Login { .. } => commands::auth::login(config, interactive).await,
            }
        }
        Commands::Workspace { command } => match command {
            WorkspaceCommand::Select { workspace_id } => {
                commands::workspace::run_select(config, &workspace_id).await
            }
        },
        Commands::Node { command } => match command {
            NodeCommand::List => commands::node::run_list(config).await,
        },
        Commands::Admin { command } => match command {
            AdminCommand::AddAuthRule { dry_run, rule } => {
                let (workspace_id, rule) = rule.into_rule();
                commands::admin::run_add(config, &workspace_id, rule, dry_run).await
            }
            AdminCommand::DeleteAuthRule {
                workspace_id,
                index,
            } => commands::admin::run_delete(config, &workspace_id, index).await,
            AdminCommand::ListAuthRules { workspace_id } => {
                commands::admin::run_list(config, &workspace_id).await
            }
        },
    }
}

/// Prints an error with its context chain and a remediation hint
fn report(err: &anyhow::Error, verbose: bool) {
    eprintln!("{} {}", "error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".red(), cause);
    }
    if let Some(hint) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<PlatformError>())
        .and_then(PlatformError::hint)
    {
        eprintln!("{} {}", "hint:".yellow().bold(), hint);
    }
    if verbose {
        eprintln!("{err:?}");
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tenzir_platform=debug"
    } else {
        "tenzir_platform=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
