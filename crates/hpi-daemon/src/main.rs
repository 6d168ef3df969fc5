//! HPI Daemon - Main entry point
//!
//! Hosts the configured domains and keeps their RPTs current from the
//! configured discovery handlers.

mod config;
mod simulator;
mod state;

use anyhow::Result;
use clap::Parser;
use hpi_core::{DomainId, Registry};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hpid")]
#[command(about = "Platform management daemon serving HPI domains")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "hpid.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run every handler once, print the resulting RPTs and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("hpid v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;
    let state = state::AppState::new(config)?;
    let handlers = state.handlers()?;

    info!(
        domains = state.registry.domain_ids().len(),
        handlers = handlers.len(),
        "Configuration loaded"
    );

    let (tx, rx) = mpsc::channel(state.config.daemon.event_queue_depth.max(1));
    let dispatcher = state::spawn_dispatcher(state.registry.clone(), rx);

    if args.once {
        for (domain, mut handler) in handlers {
            let mut refusals = state::Refusals::new();
            let queued = state::run_once(&mut handler, domain, &tx, &mut refusals).await?;
            info!(domain = %domain, events = queued, "Handler pass complete");
        }
        drop(tx);
        let applied = dispatcher.await?;
        info!(applied, "Dispatch complete");

        for domain in state.registry.domain_ids() {
            print_rpt(&state.registry, domain)?;
        }
    } else {
        let period = Duration::from_secs(state.config.daemon.rescan_interval_secs.max(1));
        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|(domain, handler)| state::spawn_handler(handler, domain, period, tx.clone()))
            .collect();
        drop(tx);

        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        for task in tasks {
            task.abort();
        }
        dispatcher.abort();
    }

    state.save_uids()?;
    Ok(())
}

fn print_rpt(registry: &Registry, domain: DomainId) -> Result<()> {
    let info = registry.domain_info(domain)?;
    println!(
        "Domain {} '{}' ({} resources, {} updates):",
        info.id, info.tag, info.rpt.resource_count, info.rpt.update_count
    );
    for resource in registry.iterate(domain)? {
        println!(
            "  [{}] uid {} {} {}",
            resource.id,
            resource.uid,
            resource.entity_path(),
            resource.tag()
        );
        for rdr in registry.rdrs(domain, resource.id)? {
            println!(
                "      {} {} {}",
                rdr.record_type(),
                rdr.record_id,
                rdr.id_string
            );
        }
    }
    Ok(())
}
