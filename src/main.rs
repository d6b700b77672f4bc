use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chime::config::SchedulerConfig;
use chime::dashboard::{run_dashboard, DashboardState};
use chime::scheduler::{JobSpec, Scheduler, TypeOptions};
use chime::shutdown::install_shutdown_handler;
use chime::store::SqliteStore;
use chime::worker::ShellExecutor;

#[derive(Parser, Debug)]
#[command(name = "chime")]
#[command(about = "A distributed, database-backed job scheduler")]
struct Args {
    /// Path to the shared SQLite job store
    #[arg(long, default_value = "chime.db")]
    store: PathBuf,

    /// Number of concurrent worker sessions
    #[arg(long, default_value = "5")]
    concurrency: usize,

    /// Default per-type lock duration in milliseconds
    #[arg(long, default_value = "600000")]
    lock_duration_ms: u64,

    /// Delay between idle rescans in milliseconds
    #[arg(long, default_value = "10000")]
    idle_time_ms: u64,

    /// JSON file with jobs to schedule on startup (duplicates ignored)
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Port for the web dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let bootstrap: Vec<JobSpec> = match args.jobs {
        Some(ref path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let mut config = SchedulerConfig::new()
        .with_concurrency(args.concurrency)
        .with_lock_duration_ms(args.lock_duration_ms)
        .with_idle_time_ms(args.idle_time_ms);
    for job in bootstrap {
        config = config.with_job(job);
    }

    tracing::info!(
        store = %args.store.display(),
        concurrency = config.concurrency,
        idle_time_ms = config.idle_time_ms,
        "Starting chime node"
    );

    let store = Arc::new(SqliteStore::open(&args.store)?);
    let scheduler = Scheduler::new(store.clone(), config);

    // The built-in type: payload {"command": "..."} run via `sh -c`.
    scheduler.define("shell", TypeOptions::default(), ShellExecutor::new());
    scheduler.start()?;

    if let Some(port) = args.dashboard_port {
        let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
        let state = DashboardState {
            scheduler: scheduler.clone(),
            store: store.clone(),
        };
        tokio::spawn(run_dashboard(addr, state));
    }

    let shutdown = install_shutdown_handler();
    shutdown.cancelled().await;
    scheduler.stop();

    Ok(())
}
