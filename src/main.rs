use clap::Parser;
use std::process;
use std::sync::Arc;

use derrick::api::{self, ApiState};
use derrick::config::{Args, Settings};
use derrick::control::ControlSurface;
use derrick::profile::SystemProfile;
use derrick::{HistoryStore, IngestServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();
    let settings = match Settings::load(&args) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(2);
        }
    };

    let profile = SystemProfile::detect();
    let worker_threads = settings.worker_threads(&profile);
    let strict = settings.strict_durability(&profile);

    println!("--- [Derrick Resource Manager] ---");
    println!("Detected Cores: {}", profile.logical_cores);
    println!("Worker Threads: {}", worker_threads);
    println!("Durability Mode: {}", if strict { "Strict (Fsync)" } else { "High Throughput (Async)" });
    println!("----------------------------------");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(settings, strict)) {
        error!("startup failed: {}", e);
        eprintln!("Startup failed: {}", e);
        process::exit(1);
    }
}

async fn async_main(settings: Settings, strict: bool) -> derrick::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    info!(path = %settings.history_path.display(), "opening history store");
    let store = Arc::new(HistoryStore::open(&settings.history_path, strict)?);
    let control = Arc::new(ControlSurface::default());

    let api_state = ApiState {
        store: store.clone(),
        control,
        stale_after: settings.stale_after(),
    };
    let (api_addr, api_server) = api::bind_api(api_state, &settings.api_addr)?;
    tokio::spawn(api_server);
    info!("HTTP API listening on {}", api_addr);

    let server = IngestServer::bind(&settings.listen_addr, store, settings.frame_limits()).await?;
    tokio::spawn(server.run());

    println!("Node is Ready.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
    println!("Shutting down.");
    Ok(())
}
