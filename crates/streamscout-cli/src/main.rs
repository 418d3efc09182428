mod export;
mod launcher;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use streamscout_browser::{ChromiumFactory, load_registry};
use streamscout_core::capture::JobCaptures;
use streamscout_core::config::ScannerConfig;
use streamscout_core::executor::ExecutorService;
use streamscout_core::job::{JobStatus, SubmitJobRequest, to_local_naive};
use streamscout_core::scan::ScanService;
use streamscout_core::scheduler::{SchedulerService, TracingSchedulerReporter};
use streamscout_core::session::SessionFactory;
use streamscout_core::store::{FsJobStore, JobStore};

use export::JsonExporter;
use launcher::SubprocessLauncher;

#[derive(Parser)]
#[command(
    name = "streamscout",
    version,
    about = "Scheduled browser-driven stream manifest scanner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a scan job for later execution
    Submit {
        /// Site URLs to scan
        #[arg(required = true)]
        sites: Vec<String>,

        /// When to run: "YYYY-MM-DD HH:MM" local time, or RFC 3339
        #[arg(short, long)]
        run_at: String,

        /// Fresh visits per site
        #[arg(short, long)]
        visits: Option<u32>,

        /// Concurrent browser sessions per scan round
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run the polling scheduler until interrupted
    Scheduler,

    /// Execute one claimed job (normally spawned by the scheduler)
    Execute {
        #[arg(long)]
        job_id: String,
    },

    /// Show the state of one job, or of every job on disk
    Status {
        #[arg(long)]
        job_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("streamscout=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ScannerConfig::from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            sites,
            run_at,
            visits,
            workers,
        } => cmd_submit(sites, &run_at, visits, workers, &config)?,
        Commands::Scheduler => cmd_scheduler(config).await?,
        Commands::Execute { job_id } => cmd_execute(&job_id, config).await?,
        Commands::Status { job_id } => cmd_status(job_id.as_deref(), &config)?,
    }

    Ok(())
}

/// Accepts either local wall-clock minutes or a timezone-qualified
/// RFC 3339 timestamp, normalized to local naive time.
fn parse_run_at(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(to_local_naive(dt));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").with_context(|| {
        format!("Invalid run time {raw:?}: expected \"YYYY-MM-DD HH:MM\" or RFC 3339")
    })
}

fn cmd_submit(
    sites: Vec<String>,
    run_at: &str,
    visits: Option<u32>,
    workers: Option<usize>,
    config: &ScannerConfig,
) -> Result<()> {
    let store = FsJobStore::open(config.jobs_dir())?;
    let run_at = parse_run_at(run_at)?;

    let job = SubmitJobRequest::new(sites, run_at)
        .with_visits(visits.unwrap_or(config.default_visits))
        .with_workers(workers.unwrap_or(config.worker_cap))
        .into_job(Local::now().naive_local());
    let record = store.put(&job)?;

    tracing::info!(
        job_id = %job.job_id,
        run_at = %job.run_at.format("%Y-%m-%d %H:%M"),
        record = %record.display(),
        "Job submitted"
    );
    println!("{}", job.job_id);
    Ok(())
}

async fn cmd_scheduler(config: ScannerConfig) -> Result<()> {
    let store = FsJobStore::open(config.jobs_dir())?;
    let launcher = SubprocessLauncher::from_current_exe(config.logs_dir())?;
    let scheduler = SchedulerService::new(store, launcher, &config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            trigger.cancel();
        }
    });

    scheduler.run(cancel, &TracingSchedulerReporter).await?;
    Ok(())
}

async fn cmd_execute(job_id: &str, config: ScannerConfig) -> Result<()> {
    let store = FsJobStore::open(config.jobs_dir())?;
    let (status, job) = store
        .find(job_id)?
        .with_context(|| format!("No record for {job_id}"))?;
    match status {
        JobStatus::Running => {}
        // Direct invocation without a scheduler: claim the record ourselves.
        JobStatus::Pending => {
            store.transition(job_id, JobStatus::Pending, JobStatus::Running)?;
        }
        terminal => anyhow::bail!("{job_id} already finished ({terminal})"),
    }

    let registry = load_registry(config.selectors_path.as_deref())?;
    let factory: Arc<dyn SessionFactory> = Arc::new(ChromiumFactory::launch(config.headless).await?);
    let scanner = ScanService::new(factory, registry, config.clone());
    let exporter = JsonExporter::new(config.results_dir());
    let executor = ExecutorService::new(store);

    let mut captures = JobCaptures::new();
    executor
        .run(&job, &scanner, &exporter, &mut captures)
        .await?;
    Ok(())
}

fn cmd_status(job_id: Option<&str>, config: &ScannerConfig) -> Result<()> {
    let store = FsJobStore::open(config.jobs_dir())?;

    if let Some(job_id) = job_id {
        match store.find(job_id)? {
            Some((status, job)) => println!(
                "{} {} run_at={} sites={}",
                job.job_id,
                status,
                job.run_at.format("%Y-%m-%d %H:%M"),
                job.sites.len()
            ),
            None => println!("{job_id}: not found"),
        }
        return Ok(());
    }

    for status in JobStatus::ALL {
        let dir = store.state_dir(status);
        let mut records: Vec<_> = std::fs::read_dir(&dir)
            .with_context(|| format!("Cannot read {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        records.sort();

        println!("{status} ({}):", records.len());
        for path in records {
            match FsJobStore::load(&path) {
                Ok(job) => println!(
                    "  {} run_at={} sites={}",
                    job.job_id,
                    job.run_at.format("%Y-%m-%d %H:%M"),
                    job.sites.len()
                ),
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "Unreadable record"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_at_local_minutes() {
        let parsed = parse_run_at("2026-09-14 18:30").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M").to_string(), "2026-09-14 18:30");
    }

    #[test]
    fn test_parse_run_at_rfc3339_normalizes_to_local() {
        let raw = "2026-09-14T18:30:00+02:00";
        let expected = to_local_naive(DateTime::parse_from_rfc3339(raw).unwrap());
        assert_eq!(parse_run_at(raw).unwrap(), expected);
    }

    #[test]
    fn test_parse_run_at_rejects_garbage() {
        assert!(parse_run_at("tomorrow at noon").is_err());
        assert!(parse_run_at("2026-09-14").is_err());
    }
}
