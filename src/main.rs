use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fastmeter::config::{FastmeterConfig, LogFormat, LoggingConfig};
use fastmeter::throughput::provider::FastProvider;
use fastmeter::throughput::{
    report, Coordinator, EndpointSource, HttpFetcher, StaticEndpoints,
};

#[derive(Parser)]
#[command(
    name = "fastmeter",
    about = "Download throughput measurement against fast.com endpoints",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one download throughput measurement
    Measure {
        /// Measurement window (e.g. 10s, 500ms, 1m 30s)
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Maximum parallel downloads
        #[arg(long)]
        concurrency: Option<usize>,

        /// User-Agent sent with every request
        #[arg(long)]
        user_agent: Option<String>,

        /// Fail on non-2xx download responses
        #[arg(long)]
        strict_status: bool,

        /// Skip discovery and download from these URLs
        #[arg(long = "url")]
        urls: Vec<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List the download endpoints fast.com hands out
    Endpoints {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolved = FastmeterConfig::resolve(cli.config.as_deref())?;
    init_tracing(&resolved.config.logging);
    resolved.log();
    let mut config = resolved.config;

    match cli.command {
        Commands::Measure {
            duration,
            concurrency,
            user_agent,
            strict_status,
            urls,
            json,
        } => {
            if let Some(d) = duration {
                config.measure.duration = d;
            }
            if let Some(c) = concurrency {
                config.measure.concurrency = c;
            }
            if let Some(ua) = user_agent {
                config.measure.user_agent = ua;
            }
            config.measure.strict_status |= strict_status;
            config.validate()?;

            let source: Arc<dyn EndpointSource> = if urls.is_empty() {
                Arc::new(
                    FastProvider::new(&config.provider, &config.measure.user_agent)
                        .context("failed to build discovery client")?,
                )
            } else {
                Arc::new(StaticEndpoints(urls))
            };
            let fetcher = HttpFetcher::new(&config.measure)
                .context("failed to build download client")?;

            tracing::info!(
                duration = ?config.measure.duration,
                concurrency = config.measure.concurrency,
                "Running download measurement"
            );
            let coordinator = Coordinator::new(config.measure.clone(), source, Arc::new(fetcher));
            let result = coordinator.run().await.context("measurement failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", report::format_summary(&result));
            }
        }
        Commands::Endpoints { json } => {
            config.validate()?;
            let provider = FastProvider::new(&config.provider, &config.measure.user_agent)
                .context("failed to build discovery client")?;
            let urls = provider
                .list_endpoints()
                .await
                .context("endpoint discovery failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&urls)?);
            } else {
                for url in urls {
                    println!("{}", url);
                }
            }
        }
    }

    Ok(())
}
