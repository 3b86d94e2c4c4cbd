use anyhow::Result;
use clap::Parser;
use minutary::{
    app,
    cli::{handle_jobs_command, handle_refresh_command, handle_status_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Minutary {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Status) => {
            handle_status_command().await?;
            return Ok(());
        }
        Some(CliCommand::Refresh(args)) => {
            handle_refresh_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Jobs(args)) => {
            handle_jobs_command(args).await?;
            return Ok(());
        }
        None => {}
    }

    app::run_service().await
}
