//! ckptsync CLI
//!
//! One-shot checkpoint transfers for a training run.
//!
//! # Commands
//!
//! - `upload` - Replace the run's remote prefix with its checkpoint directory
//! - `download` - Pull the `--load-from-run` prefix into its local directory
//! - `upload-file` / `download-file` - Transfer a single named checkpoint
//! - `keys` - Print the remote keys without touching storage

use std::path::PathBuf;

use checkpoint_sync::{KeyMapper, SyncEngine, SyncEngineConfig};
use clap::{Parser, Subcommand};
use sync_core::{Error, StorageConfig, SyncConfig, SyncReport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Mirror training checkpoint directories to a bucket.
#[derive(Parser, Debug)]
#[command(name = "ckptsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; flags override its fields
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Project name
    #[arg(global = true, short, long)]
    project: Option<String>,

    /// Current run identifier
    #[arg(global = true, long)]
    run_id: Option<String>,

    /// Run to resume from
    #[arg(global = true, long)]
    load_from_run: Option<String>,

    /// Key derivation root (defaults to the current directory)
    #[arg(global = true, long)]
    root: Option<PathBuf>,

    /// S3 bucket name
    #[arg(global = true, long, conflicts_with = "local_bucket")]
    bucket: Option<String>,

    /// S3 region
    #[arg(global = true, long)]
    region: Option<String>,

    /// Custom S3 endpoint (MinIO, LocalStack)
    #[arg(global = true, long)]
    endpoint_url: Option<String>,

    /// Local directory used as the bucket
    #[arg(global = true, long)]
    local_bucket: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(global = true, long)]
    json: bool,

    /// Enable debug logging
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace the remote prefix with the save directory
    Upload,

    /// Download the load prefix into the load directory
    Download,

    /// Upload one file from the save directory
    UploadFile {
        /// File name inside the save directory
        name: String,
    },

    /// Download one file into the load directory
    DownloadFile {
        /// File name under the load prefix
        name: String,
    },

    /// Print save and load keys
    Keys,
}

impl Cli {
    /// Merge the config file (if any) with flag overrides
    fn sync_config(&self) -> sync_core::Result<SyncConfig> {
        let mut config = match (&self.config, &self.project) {
            (Some(path), _) => SyncConfig::from_json_file(path)?,
            (None, Some(project)) => SyncConfig::new(project),
            (None, None) => {
                return Err(Error::InvalidConfig {
                    message: "either --config or --project is required".to_string(),
                })
            }
        };

        if let Some(project) = &self.project {
            config.project = project.clone();
        }
        if let Some(run_id) = &self.run_id {
            config.run_id = run_id.clone();
        }
        if let Some(load) = &self.load_from_run {
            config.load_from_run = Some(load.clone());
        }
        if let Some(root) = &self.root {
            config.root_path = Some(root.clone());
        }

        if let Some(bucket) = &self.bucket {
            config.storage = StorageConfig::S3 {
                bucket: bucket.clone(),
                region: self.region.clone(),
                endpoint: self.endpoint_url.clone(),
                prefix: None,
                force_path_style: self.endpoint_url.is_some(),
            };
        } else if let Some(path) = &self.local_bucket {
            config.storage = StorageConfig::Local { path: path.clone() };
        } else if let StorageConfig::S3 {
            region, endpoint, ..
        } = &mut config.storage
        {
            if self.region.is_some() {
                *region = self.region.clone();
            }
            if self.endpoint_url.is_some() {
                *endpoint = self.endpoint_url.clone();
            }
        }

        config.validate()?;
        Ok(config)
    }
}

async fn build_engine(config: &SyncConfig) -> sync_core::Result<SyncEngine> {
    let root = config.resolve_root()?;
    let storage = storage::from_config(&config.storage).await?;

    let mut engine_config = SyncEngineConfig::new(config.save_dir(&root)).with_root_path(&root);
    if let Some(load_dir) = config.load_dir(&root) {
        engine_config = engine_config.with_load_dir(load_dir);
    }
    SyncEngine::new(storage, engine_config).await
}

/// One-line human summary of a transfer
fn format_report(report: &SyncReport) -> String {
    format!(
        "{:?} {}: {} files, {} bytes, {} deleted{} ({} ms, {:.2} MB/s)",
        report.direction,
        report.remote_key,
        report.transferred,
        report.bytes,
        report.deleted,
        if report.rotated { ", rotated last-v1.ckpt" } else { "" },
        report.elapsed_ms,
        report.throughput_mbps()
    )
}

fn print_report(report: &SyncReport, json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", format_report(report));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "ckptsync=debug,checkpoint_sync=debug,storage=debug"
    } else {
        "ckptsync=info,checkpoint_sync=info,storage=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cli.sync_config()?;

    match &cli.command {
        Commands::Keys => {
            let root = config.resolve_root()?;
            let mapper = KeyMapper::new(&root)?;
            println!("save: {}", mapper.key_for(&config.save_dir(&root))?);
            match config.load_dir(&root) {
                Some(load_dir) => println!("load: {}", mapper.key_for(&load_dir)?),
                None => println!("load: -"),
            }
        }
        Commands::Upload => {
            let engine = build_engine(&config).await?;
            let report = engine.upload().await?;
            print_report(&report, cli.json)?;
        }
        Commands::Download => {
            let engine = build_engine(&config).await?;
            let report = engine.download().await?;
            print_report(&report, cli.json)?;
        }
        Commands::UploadFile { name } => {
            let engine = build_engine(&config).await?;
            let size = engine.upload_named(name).await?;
            println!(
                "uploaded {} ({} bytes) to {}",
                name,
                size,
                engine.save_binding().object_key(name)
            );
        }
        Commands::DownloadFile { name } => {
            let engine = build_engine(&config).await?;
            let size = engine.download_named(name).await?;
            println!(
                "downloaded {} ({} bytes) to {}",
                name,
                size,
                engine.resume_checkpoint_path(name)?.display()
            );
        }
    }

    Ok(())
}
