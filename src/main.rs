//! cfddns - dynamic DNS for Cloudflare A/AAAA records
//!
//! Loads the configuration, wires the resolver, Cloudflare client and
//! notifier into a reconciler, then either runs one check (`--once`) or
//! hands control to the supervisor until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cfddns::cloudflare::CloudflareClient;
use cfddns::config::Config;
use cfddns::daemon::{Supervisor, SupervisorSettings};
use cfddns::ip::IpResolver;
use cfddns::notify::Notifier;
use cfddns::reconcile::Reconciler;
use cfddns::state::ServiceStats;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config location
const DEFAULT_CONFIG_PATH: &str = "/etc/cfddns/config.toml";

//==============================================================================
// Main
//==============================================================================

#[derive(Debug, Parser)]
#[command(name = "cfddns")]
#[command(version = VERSION)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cfddns {}", VERSION);
    let config = Config::load_with_retry(&args.config)
        .await
        .context("Config load failed")?;
    config.log_summary();

    let stats = ServiceStats::shared(Utc::now());
    let ip_source = Arc::new(IpResolver::new(config.timeout).context("IP resolver failed")?);
    let provider = Arc::new(CloudflareClient::new(config.timeout).context("Cloudflare client failed")?);
    let notifier = Arc::new(Notifier::from_config(&config).context("Notifier failed")?);

    let reconciler = Arc::new(Reconciler::new(
        ip_source.clone(),
        provider,
        notifier.clone(),
        config.domains.clone(),
        stats.clone(),
    ));

    if args.once {
        let outcome = reconciler.run_tick().await;
        info!("Single check finished: {:?}", outcome);
        return Ok(());
    }

    let supervisor = Arc::new(Supervisor::new(
        reconciler,
        ip_source,
        notifier,
        stats,
        SupervisorSettings::from(&config),
    ));
    let outcome = supervisor.run().await?;
    std::process::exit(outcome.exit_code());
}
