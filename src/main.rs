//! Tsubame - minimal media upload relay
//!
//! `tsubame serve` runs the relay; `tsubame push` uploads files with the
//! client queue, either straight to the provider or through a relay.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tsubame::client::transport::{DirectTransport, RelayTransport, UploadTransport};
use tsubame::client::{UploadQueue, UploadStatus};
use tsubame::config::Config;
use tsubame::logging::{self, LogFormat};
use tsubame::server::Server;

/// Tsubame - upload files to a media provider, directly or via a relay
#[derive(Parser, Debug)]
#[command(name = "tsubame")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server
    Serve {
        /// Path to a YAML configuration file; environment variables are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Upload files and report per-file progress
    Push {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Relay base URL; when set, files go through the relay
        #[arg(long, env = "RELAY_URL")]
        relay: Option<String>,

        /// Provider account for direct uploads
        #[arg(long, env = "CLOUD_NAME")]
        cloud_name: Option<String>,

        /// Unsigned upload preset for direct uploads
        #[arg(long, env = "UPLOAD_PRESET")]
        upload_preset: Option<String>,

        /// Provider API endpoint for direct uploads
        #[arg(long, env = "PROVIDER_BASE_URL", default_value = "https://api.cloudinary.com")]
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init(&args.log_level, args.log_format)?;

    info!("Tsubame v{}", tsubame::VERSION);

    match args.command {
        Command::Serve { config } => serve(config).await,
        Command::Push {
            files,
            relay,
            cloud_name,
            upload_preset,
            endpoint,
        } => {
            let transport: Arc<dyn UploadTransport> = match (relay, cloud_name, upload_preset) {
                (Some(relay), _, _) => Arc::new(RelayTransport::new(&relay)?),
                (None, Some(cloud), Some(preset)) => {
                    Arc::new(DirectTransport::new(&endpoint, &cloud, preset)?)
                }
                _ => anyhow::bail!(
                    "either --relay or both --cloud-name and --upload-preset are required"
                ),
            };
            push(files, transport).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config = Config::from_env()?;
            info!("Loaded configuration from environment");
            config
        }
    };

    #[cfg(feature = "metrics")]
    let _metrics = if config.metrics.enabled {
        let mut metrics = tsubame::metrics::server::MetricsServer::from_config(&config.metrics);
        let addr = metrics.start().await?;
        info!("Metrics available at http://{}/metrics", addr);
        Some(metrics)
    } else {
        None
    };

    Server::new(config)?.run().await?;
    Ok(())
}

async fn push(files: Vec<PathBuf>, transport: Arc<dyn UploadTransport>) -> anyhow::Result<()> {
    let queue = UploadQueue::new();
    queue.add_files(&files)?;
    info!(files = queue.len(), transport = transport.name(), "Queued files");

    let upload = queue.upload_all(transport);
    tokio::pin!(upload);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    let report = loop {
        tokio::select! {
            result = &mut upload => break result?,
            _ = ticker.tick() => {
                for item in queue.items() {
                    if item.status == UploadStatus::Uploading {
                        info!(file = %item.file.name, progress = item.progress, eta = %item.eta, "Uploading");
                    }
                }
            }
        }
    };

    for item in queue.items() {
        match item.status {
            UploadStatus::Success => info!(
                file = %item.file.name,
                url = item.remote_url.as_deref().unwrap_or_default(),
                "Uploaded"
            ),
            status => error!(file = %item.file.name, ?status, "Not uploaded"),
        }
    }

    if let Err(e) = report.into_result() {
        error!("Upload batch failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
