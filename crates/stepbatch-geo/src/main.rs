//! Command line client resolving IP addresses through the step scheduler.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use stepbatch_geo::{GeoConfig, GeoLookup};
use stepbatch_server::observability::{init_logging, register_scheduler_metrics};
use tracing::info;

#[derive(Parser)]
#[command(name = "stepbatch-geo")]
#[command(about = "Locate IP addresses with batched, deduplicated lookups", long_about = None)]
struct Args {
    /// Addresses to locate.
    #[arg(required = true)]
    ips: Vec<String>,

    /// YAML configuration file. Without it, configuration comes from
    /// STEPBATCH_* environment variables.
    #[arg(long, short, env = "STEPBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the provider batch endpoint.
    #[arg(long)]
    endpoint: Option<String>,

    /// Print compact JSON instead of pretty JSON.
    #[arg(long, default_value_t = false)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GeoConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GeoConfig::from_env().context("loading configuration from environment")?,
    };
    if let Some(endpoint) = args.endpoint {
        config.geo.endpoint = endpoint;
        config.validate()?;
    }

    init_logging((&config.scheduler.logging).into());
    register_scheduler_metrics();

    let lookup = GeoLookup::from_config(&config)?;
    info!(addresses = args.ips.len(), endpoint = %config.geo.endpoint, "resolving addresses");

    let entries: Vec<_> = lookup
        .lookup_all(&args.ips)
        .await
        .into_iter()
        .map(|(ip, result)| match result {
            Ok(info) => json!({ "ip": ip, "location": info }),
            Err(err) => json!({ "ip": ip, "error": err.to_string() }),
        })
        .collect();

    let output = if args.compact {
        serde_json::to_string(&entries)?
    } else {
        serde_json::to_string_pretty(&entries)?
    };
    println!("{output}");

    Ok(())
}
