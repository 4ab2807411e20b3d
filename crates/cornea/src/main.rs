mod cli;
mod commands;
mod error;
mod output;
mod replay;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cornea_core::CoreConfig;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "cornea", &mut std::io::stdout());
            Ok(())
        }

        Command::Replay(args) => {
            let config = core_config(&cli.global)?;
            tracing::debug!(?config, "core configuration");
            commands::replay::handle(args, config, &cli.global).await
        }
    }
}

/// Core tuning from the config file and profile. An explicit profile
/// must exist; without one, a missing default profile falls back to the
/// global defaults.
fn core_config(global: &GlobalOpts) -> Result<CoreConfig, CliError> {
    let cfg = cornea_config::load_config()?;
    match cfg.profile(global.profile.as_deref()) {
        Ok((_, profile)) => Ok(cfg.core_config(Some(profile))),
        Err(_) if global.profile.is_none() => Ok(cfg.core_config(None)),
        Err(e) => Err(e.into()),
    }
}
