mod config_loader;
mod monitor_api;
mod orchestrator;
mod summary;


use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use catalog::Catalog;
use eval_client::EvalClient;
use observability::{init_metrics, init_tracing};
use strategy_genetic::GeneticOptimizer;

use crate::config_loader::load_engine_config;
use crate::monitor_api::{build_router, MonitorState};
use crate::orchestrator::Orchestrator;
use crate::summary::SummarySlot;

#[derive(Parser, Debug)]
#[command(name = "kitrotor", about = "Rotable kit logistics runner", version)]
struct Args {
    /// Evaluation platform API key.
    #[arg(long, env = "KITROTOR_API_KEY")]
    api_key: String,
    /// Evaluation platform base URL.
    #[arg(long, default_value = "http://localhost:8080")]
    base_url: String,
    /// Directory holding airports.csv, aircraft_types.csv and
    /// flight_plan.csv.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
    /// Monitoring API listen address.
    #[arg(long, default_value = "0.0.0.0:9100")]
    listen: SocketAddr,
    /// Optimizer seed override.
    #[arg(long)]
    seed: Option<u64>,
    /// Round limit override (full game is 720).
    #[arg(long)]
    rounds: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing("kitrotor");
    let prometheus = init_metrics();
    let args = Args::parse();

    let mut cfg = load_engine_config();
    if let Some(seed) = args.seed {
        cfg.runner.seed = seed;
    }
    if let Some(rounds) = args.rounds {
        cfg.runner.total_rounds = rounds;
    }

    let catalog = Catalog::load_dir(&args.data_dir)
        .with_context(|| format!("loading static tables from {}", args.data_dir.display()))?;
    tracing::info!(
        airports = catalog.all_airports().count(),
        flights = catalog.schedule().len(),
        hub = %catalog.hub().code,
        "catalog loaded"
    );

    let slot = Arc::new(SummarySlot::default());
    let stop = Arc::new(AtomicBool::new(false));

    let monitor = MonitorState {
        slot: slot.clone(),
        stop: stop.clone(),
        prometheus,
    };
    let app = build_router(monitor);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!(addr = %args.listen, "monitoring api started");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "monitoring api stopped");
        }
    });

    let service = Arc::new(EvalClient::new(args.base_url, args.api_key));
    let planner = Arc::new(GeneticOptimizer::new(cfg.genetic, cfg.greedy));
    let mut orchestrator = Orchestrator::new(service, planner, &catalog, cfg, slot, stop);

    orchestrator.run().await?;
    tracing::info!("run complete");
    Ok(())
}
