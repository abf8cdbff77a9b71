use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webui2loki::config::{self, Config};
use webui2loki::cursor::CursorStore;
use webui2loki::shipper::Shipper;
use webui2loki::sink::LokiClient;

#[derive(Parser)]
#[command(name = "webui2loki")]
#[command(about = "Ship OpenWebUI activity to Grafana Loki", long_about = None)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the OpenWebUI SQLite database
    #[arg(long)]
    db: Option<PathBuf>,

    /// Path to the audit log file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// URL of the Loki push API
    #[arg(long)]
    loki_url: Option<String>,

    /// Number of events to send in a single batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds to sleep between extraction cycles
    #[arg(long)]
    interval: Option<u64>,

    /// Additional stream labels (key=value, repeatable)
    #[arg(long = "label")]
    labels: Vec<String>,

    /// Start the database watermark at this epoch time instead of now
    #[arg(long)]
    since: Option<i64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webui2loki=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let sink = Arc::new(LokiClient::new(
        config.loki_url.clone(),
        config.push_timeout,
    )?);

    let mut shipper = Shipper::new(config, sink);
    if let Some(since) = cli.since {
        shipper = shipper.with_cursors(CursorStore::starting_at(since));
    }

    if cli.once {
        let report = shipper.run_once().await;
        info!(
            extracted = report.extracted,
            sent = report.batches_sent,
            failed = report.batches_failed,
            "single cycle complete"
        );
    } else {
        shipper.run_forever().await;
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    let mut config = match config::resolve_config_path(cli.config.as_deref()) {
        Some(path) => config::load_config(&path)?,
        None => match &cli.db {
            Some(db) => Config::new(db.clone()),
            None => {
                eprintln!("Error: no config file found and no --db given.");
                eprintln!("Searched locations:");
                eprintln!("  ~/.config/webui2loki/config.yml");
                eprintln!("  /etc/webui2loki/config.yml");
                eprintln!("\nUse --config <path> or pass --db <path> directly.");
                std::process::exit(1);
            }
        },
    };

    if let Some(db) = &cli.db {
        config.database = db.clone();
    }
    if let Some(audit_log) = &cli.audit_log {
        config.audit_log = Some(audit_log.clone());
    }
    if let Some(loki_url) = &cli.loki_url {
        config.loki_url = loki_url.clone();
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(interval) = cli.interval {
        config.interval = Duration::from_secs(interval);
    }

    for raw in &cli.labels {
        match config::parse_label(raw) {
            Some((key, value)) => {
                config.labels.insert(key, value);
            }
            None => warn!(label = %raw, "ignoring invalid label, expected key=value"),
        }
    }
    config.ensure_default_labels();

    config::validate_config(&config)?;

    Ok(config)
}
