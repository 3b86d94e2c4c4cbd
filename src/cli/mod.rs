use crate::config::Config;
use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};

pub mod daemon_client;

pub use daemon_client::DaemonClient;

#[derive(Parser, Debug)]
#[command(name = "minutary")]
#[command(about = "Entitlement and usage metering for Minutary", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Show the resolved entitlement and meeting allowance
    Status,
    /// Refresh the entitlement from the backend
    Refresh(RefreshCliArgs),
    /// Track or inspect transcription jobs
    Jobs(JobsCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct RefreshCliArgs {
    /// Adopt the backend answer even if it ranks below the cached tier
    #[arg(long)]
    pub force: bool,
}

#[derive(ClapArgs, Debug)]
pub struct JobsCliArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// Start dual-channel tracking of a job
    Track { job_id: String },
    /// Stop tracking a job
    Untrack { job_id: String },
    /// Show a job's last observed status
    Status { job_id: String },
}

pub async fn handle_status_command() -> Result<()> {
    let client = client_from_config()?;
    let Some(entitlement) = client.get_entitlement().await? else {
        println!("No entitlement resolved yet. Run `minutary refresh` to fetch one.");
        return Ok(());
    };
    let allowance = client.get_allowance().await?;

    println!("Tier: {}", entitlement.tier);
    match entitlement.usage_limit {
        Some(limit) => println!("Meetings: {}/{}", entitlement.usage_count, limit),
        None => println!("Meetings: {} (unmetered)", entitlement.usage_count),
    }
    match entitlement.secondary_usage_limit {
        Some(limit) => println!(
            "Summaries: {}/{}",
            entitlement.secondary_usage_count, limit
        ),
        None => println!(
            "Summaries: {} (unmetered)",
            entitlement.secondary_usage_count
        ),
    }
    if let Some(date) = entitlement.renewal_date.as_deref() {
        println!("Renews: {}", date);
    }
    if let Some(cancellation) = &entitlement.cancellation {
        println!("Cancels: {}", cancellation.effective_at);
    }

    if allowance.allowed {
        match allowance.remaining {
            Some(remaining) => println!("Next meeting: allowed ({} remaining)", remaining),
            None => println!("Next meeting: allowed"),
        }
    } else {
        println!(
            "Next meeting: blocked ({})",
            allowance.reason.as_deref().unwrap_or("limit reached")
        );
    }

    Ok(())
}

pub async fn handle_refresh_command(args: RefreshCliArgs) -> Result<()> {
    let client = client_from_config()?;
    let entitlement = client.refresh(args.force).await?;

    println!("Refreshed. Tier: {}", entitlement.tier);
    match entitlement.usage_limit {
        Some(limit) => println!("Meetings: {}/{}", entitlement.usage_count, limit),
        None => println!("Meetings: {} (unmetered)", entitlement.usage_count),
    }

    Ok(())
}

pub async fn handle_jobs_command(args: JobsCliArgs) -> Result<()> {
    let client = client_from_config()?;

    match args.command {
        JobsCommand::Track { job_id } => {
            client.track_job(&job_id).await?;
            println!("Tracking job {}", job_id);
        }
        JobsCommand::Untrack { job_id } => {
            client.untrack_job(&job_id).await?;
            println!("Stopped tracking job {}", job_id);
        }
        JobsCommand::Status { job_id } => {
            let status = client.job_status(&job_id).await?;
            let source = if status.tracked { "tracked" } else { "backend" };
            println!("Job {}: {} ({})", status.job_id, status.status, source);
            if let Some(error) = status.error.as_deref() {
                println!("Error: {}", error);
            }
        }
    }

    Ok(())
}

fn client_from_config() -> Result<DaemonClient> {
    let config = Config::load()?;
    Ok(DaemonClient::new(config.api.port))
}
