use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use stopguard::config::StopguardConfig;
use stopguard::controller::Controller;
use stopguard::service::{ChildExit, ChildService};
use stopguard::signals::{self, OsSignals};
use stopguard::startable::Startable;
use stopguard::supervisor;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Exit status when the service never came up.
const START_FAILED_EXIT_CODE: i32 = 2;

/// Run a command under a bounded-time shutdown protocol: SIGINT/SIGTERM
/// trigger a graceful stop, a stalled or failed stop is escalated to a
/// forced one, and the process exits with status 1 if that fails too.
#[derive(Parser, Debug)]
#[command(name = "stopguard", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "stopguard.toml")]
    config: PathBuf,

    /// Stop timeout in milliseconds (overrides config)
    #[arg(long)]
    stop_timeout: Option<u64>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (timer and transition details)
    #[arg(short, long)]
    verbose: bool,

    /// Only errors
    #[arg(short, long)]
    quiet: bool,

    /// Command to supervise, after `--` (overrides config)
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "stopguard=debug"
    } else if cli.quiet {
        "stopguard=error"
    } else {
        "stopguard=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

/// Load the config file and fold CLI overrides into it.
fn resolve_config(cli: &Cli) -> Result<StopguardConfig, stopguard::config::ConfigError> {
    let mut config = StopguardConfig::load(&cli.config)?;
    if let Some(timeout) = cli.stop_timeout {
        config.lifecycle.stop_timeout_ms = timeout;
    }
    if let Some((command, args)) = cli.command.split_first() {
        config.service.command = command.clone();
        config.service.args = args.to_vec();
    }
    config.validate()?;
    Ok(config)
}

/// Resolve when the supervised command exits, or never if nothing runs.
async fn command_exit(receiver: Option<watch::Receiver<Option<ChildExit>>>) -> Option<ChildExit> {
    let Some(mut receiver) = receiver else {
        return std::future::pending().await;
    };
    let exit = match receiver.wait_for(Option::is_some).await {
        Ok(exit) => *exit,
        Err(_) => None,
    };
    exit
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration rejected");
            std::process::exit(START_FAILED_EXIT_CODE);
        }
    };

    if cli.dry_run {
        println!("stopguard v{}", env!("CARGO_PKG_VERSION"));
        println!("Config file: {}", cli.config.display());
        println!("Stop timeout: {}ms", config.lifecycle.stop_timeout_ms);
        println!(
            "Command: {} {}",
            config.service.command,
            config.service.args.join(" ")
        );
        return;
    }

    let core = Startable::new(ChildService::new(config.service.clone()));
    let controller = Arc::new(Controller::new(core, &config.lifecycle));

    let mut handlers = match signals::install(&controller, &OsSignals) {
        Ok(handlers) => handlers,
        Err(e) => {
            tracing::error!(error = %e, "cannot install signal handlers");
            std::process::exit(START_FAILED_EXIT_CODE);
        }
    };

    // Failure is already logged by the controller
    if controller.start().await.is_err() {
        std::process::exit(START_FAILED_EXIT_CODE);
    }

    let exit = controller.core().service().exit_receiver();
    let shutdown = supervisor::wait_for_shutdown(&controller, &mut handlers, command_exit(exit)).await;
    tracing::info!(cause = ?shutdown.cause, outcome = ?shutdown.outcome, "shutdown complete");
}
