//! gstore-uploadr - stream local files into Cloud Storage
//!
//! Drives the storage engine from the command line using a config file.

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use gstore_uploadr::config::Config;
use gstore_uploadr::engine::GcsStorage;
use gstore_uploadr::store::{Connector, DefaultConnector};
use gstore_uploadr::upload::{UploadFile, UploadRequest};
use gstore_uploadr::{metrics, telemetry};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// gstore-uploadr - streaming uploads to Cloud Storage
#[derive(Parser, Debug)]
#[command(name = "gstore-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print Prometheus metrics when done
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload local files
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Form field name reported for each file
        #[arg(long, default_value = "file")]
        field: String,

        /// Content type for every file; guessed from the extension otherwise
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Remove objects from the configured container
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

/// Content type from a file extension
fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("csv") => "text/csv",
        Some("mp4") => "video/mp4",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

async fn upload(
    engine: &GcsStorage,
    files: &[PathBuf],
    field: &str,
    content_type: Option<&str>,
) -> usize {
    let request = UploadRequest::default();

    let uploads = files.iter().map(|path| {
        let request = &request;
        async move {
            let content_type = content_type.unwrap_or_else(|| guess_content_type(path));
            let file = UploadFile::open(path, field, content_type)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let stored = engine.handle_upload(request, file).await?;
            anyhow::Ok(stored)
        }
    });

    let mut failures = 0;
    for (path, outcome) in files.iter().zip(join_all(uploads).await) {
        match outcome {
            Ok(stored) => {
                let location = stored.public_url.unwrap_or_else(|| {
                    format!("{}/{}", stored.object.container(), stored.object.key())
                });
                println!("{}\t{}\t{}", path.display(), stored.size, location);
            }
            Err(e) => {
                failures += 1;
                error!(path = %path.display(), error = %e, "Upload failed");
            }
        }
    }
    failures
}

async fn remove(config: &Config, engine: &GcsStorage, keys: &[String]) -> anyhow::Result<usize> {
    let client_config = config
        .engine
        .client
        .as_ref()
        .context("engine.client is not configured")?;
    let container = config
        .engine
        .container
        .as_deref()
        .context("engine.container is not configured")?;

    let client = match engine.resolver().shared_client() {
        Some(client) => client.clone(),
        None => DefaultConnector.connect(client_config)?,
    };
    let container = client.container(container);
    let request = UploadRequest::default();

    let mut failures = 0;
    for key in keys {
        let object = container.object(key.as_str());
        match engine.remove_object(&request, &object).await {
            Ok(()) => println!("removed\t{}/{}", object.container(), object.key()),
            Err(e) => {
                failures += 1;
                error!(key = %key, error = %e, "Removal failed");
            }
        }
    }
    Ok(failures)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    telemetry::init_subscriber(&config.logging)?;

    info!("Starting gstore-uploadr v{}", gstore_uploadr::VERSION);
    info!("Loaded configuration from {:?}", args.config);

    let engine = GcsStorage::new(config.engine.to_options())?;

    let failures = match &args.command {
        Command::Upload {
            files,
            field,
            content_type,
        } => upload(&engine, files, field, content_type.as_deref()).await,
        Command::Remove { keys } => remove(&config, &engine, keys).await?,
    };

    if args.metrics && config.metrics.enabled {
        print!("{}", metrics::gather());
    }

    if failures > 0 {
        anyhow::bail!("{} operation(s) failed", failures);
    }
    Ok(())
}
