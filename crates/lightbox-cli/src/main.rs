//! CLI entry point - the composition root.
//!
//! Parses arguments, installs logging, bootstraps the queue and dispatches
//! to a handler. Errors carrying a `CliError` pick the exit code.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lightbox_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::with_defaults()?.with_overrides(cli.db, cli.concurrency);
    let mut ctx = bootstrap(config).await?;

    match cli.command {
        Commands::Upload { manifest, files } => {
            let args = handlers::upload::UploadArgs { manifest, files };
            handlers::upload::execute(&mut ctx, args).await?;
        }
        Commands::Status { json } => {
            handlers::status::execute(&ctx, json).await?;
        }
        Commands::Clear => {
            handlers::clear::execute(&ctx).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads LIGHTBOX_* fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}
