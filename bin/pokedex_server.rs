//! # Pokedex Server
//!
//! Entry point for the HTTP facade and the maintenance commands.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin pokedex_server -- serve
//! cargo run --bin pokedex_server -- populate --from 1 --to 151
//! cargo run --bin pokedex_server -- region kalos --reset
//! cargo run --bin pokedex_server -- forms charizard
//! cargo run --bin pokedex_server -- clear pokemon forms
//! ```
//!
//! Configuration comes from `Config.toml` (or `--config`) and `POKEDEX__*`
//! environment overrides.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use pokedex_sdk::{Pokedex, Settings};

#[derive(Parser)]
#[command(name = "pokedex_server", about = "Pokedex cache, aggregation pipelines and HTTP API")]
struct Cli {
    /// Config file (TOML). Defaults to ./Config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Prometheus listener, e.g. 0.0.0.0:9000.
    #[cfg(feature = "observability")]
    #[arg(long, global = true)]
    metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Overrides `server.bind_address`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Bulk-populate pokemon and species for an id range.
    Populate {
        #[arg(long, default_value = "1")]
        from: u32,
        #[arg(long, default_value = "1025")]
        to: u32,
        /// Only print the batch plan.
        #[arg(long)]
        dry_run: bool,
    },
    /// Build (or rebuild with --reset) the cached dex of a region.
    Region {
        key: String,
        #[arg(long)]
        reset: bool,
    },
    /// Aggregate the alternate forms of one or more species.
    Forms {
        #[arg(required = true)]
        species: Vec<String>,
    },
    /// Wipe cache scopes: pokemon, species, forms, regional, gender.
    Clear {
        #[arg(required = true)]
        scopes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    #[cfg(feature = "observability")]
    {
        pokedex_sdk::metrics::init_tracing();
        if let Some(addr) = cli.metrics_addr {
            pokedex_sdk::metrics::install_prometheus_exporter(addr)?;
            info!("📊 Metrics exporter on {}", addr);
        }
    }
    #[cfg(not(feature = "observability"))]
    env_logger::init();

    let settings = match cli.config {
        Some(ref path) => Settings::from_path(path)?,
        None => Settings::new()?,
    };
    info!("✅ Settings loaded (upstream {})", settings.api.base_url);

    let bind_address = settings.server.bind_address.clone();
    let pokedex = Pokedex::connect(settings).await?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(bind_address);
            pokedex_sdk::server::serve(pokedex, &bind).await?;
        }
        Command::Populate { from, to, dry_run } => {
            if dry_run {
                for (start, end) in pokedex.populator().plan(from, to) {
                    println!("{}-{}", start, end);
                }
                return Ok(());
            }
            let report = pokedex.populate(from, to).await;
            println!(
                "requested={} upserted={} skipped={} failed={:?}",
                report.requested, report.upserted, report.skipped, report.failed
            );
        }
        Command::Region { key, reset } => {
            let limit = pokedex.settings().query.max_limit;
            let page = pokedex.regional_page(&key, limit, 0, reset).await?;
            pokedex.regional_dex().wait_for_backfills().await;
            println!("{}: {} entries", key, page.total);
        }
        Command::Forms { species } => {
            for result in pokedex.species_forms_batch(&species).await {
                if result.is_placeholder() {
                    println!("{}: unavailable", result.name);
                    continue;
                }
                println!("{} (#{}):", result.name, result.species_id);
                for form in &result.forms {
                    let categories: Vec<&str> = form.categories.iter().map(|c| c.as_str()).collect();
                    println!("  {:>6} {:<28} [{}]", form.form_id, form.name, categories.join(", "));
                }
            }
        }
        Command::Clear { scopes } => {
            let cleared = pokedex.clear(&scopes).await?;
            println!(
                "cleared: {}",
                cleared.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            );
        }
    }

    Ok(())
}
