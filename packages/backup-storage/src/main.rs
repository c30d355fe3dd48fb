use anyhow::{Context, Result};
use backup_storage::package::{parse_time, validate_trigger, TIME_FORMAT};
use backup_storage::storage::{build_backend, config::CONFIG_ENV, RunConfig};
use backup_storage::{instances_for, LogSink, ManifestEntry, Package, TracingSink, TransferCoordinator};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "backup-storage")]
#[command(about = "Deliver staged backup packages to storages and cycle old backups", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/backup-storage/config.toml)
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store staged files as one package on every configured storage
    Transfer {
        /// Trigger the package belongs to
        #[arg(long)]
        trigger: String,

        /// Human-readable model label
        #[arg(long)]
        label: String,

        /// Package time as YYYY.MM.DD.HH.MM.SS (defaults to now)
        #[arg(long)]
        time: Option<String>,

        /// Staged chunk files, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List stored backups for a trigger on every configured storage
    List {
        /// Trigger to list
        #[arg(long)]
        trigger: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct StorageListing {
    storage: String,
    backups: Vec<ManifestEntry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = RunConfig::load(cli.config.as_deref()).await?;
    let storages = config.storages().context("Invalid storage configuration")?;
    let log: Arc<dyn LogSink> = Arc::new(TracingSink);

    match cli.command {
        Commands::Transfer {
            trigger,
            label,
            time,
            files,
        } => {
            let time = match time {
                Some(time) => parse_time(&time)?,
                None => parse_time(&chrono::Local::now().format(TIME_FORMAT).to_string())?,
            };
            let package = Package::from_staged_files(trigger, label, time, &files)?;
            tracing::info!("Storing package {} ({} chunk(s))", package.id(), package.chunks().len());

            let instances = instances_for(storages, log.clone());
            let report = TransferCoordinator::new(log).run(&package, &instances).await;

            let failed = report.fatal_errors().count();
            if failed > 0 {
                anyhow::bail!(
                    "{} of {} storage(s) failed for '{}' ({})",
                    failed,
                    report.instances.len(),
                    package.label(),
                    package.trigger()
                );
            }
            if report.warning_count() > 0 {
                tracing::warn!("Completed with {} warning(s)", report.warning_count());
            }
            Ok(())
        }
        Commands::List { trigger, json } => {
            validate_trigger(&trigger)?;
            let mut listings = Vec::with_capacity(storages.len());
            for storage in &storages {
                let backend = build_backend(storage, log.clone());
                let backups = backend
                    .list(&trigger)
                    .await
                    .with_context(|| format!("Failed to list {}", backend.storage_name()))?;
                listings.push(StorageListing {
                    storage: backend.storage_name(),
                    backups,
                });
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listings)?);
            } else {
                for listing in &listings {
                    println!("{} ({} backup(s))", listing.storage, listing.backups.len());
                    for entry in &listing.backups {
                        println!("  {}  {}", entry.id.time_string(), entry.remote_path.display());
                    }
                }
            }
            Ok(())
        }
    }
}
