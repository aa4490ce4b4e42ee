mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use cli::{BackupCommands, Cli, Commands, ConfigCommands};
use vtc_backup::core::entities::INSERT_ORDER;
use vtc_backup::core::environment::SERVERLESS_MARKERS;
use vtc_backup::core::{open_store, BackupError, BackupKind, BackupService, RestoreSource, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(build = cli::BUILD_TIMESTAMP, "starting vtc-backup");

    let settings = Settings::load(Some(&cli.env_file))
        .with_context(|| format!("Failed to load settings from {}", cli.env_file.display()))?;

    match cli.command {
        Commands::Backup { command } => {
            let service = open_service(settings).await?;
            handle_backup(&service, command).await?;
        }
        Commands::Env => {
            handle_env(&settings);
        }
        Commands::Config { command } => {
            handle_config(&settings, command);
        }
        #[cfg(feature = "server")]
        Commands::Serve { port, host, cors } => {
            let service = open_service(settings).await?;
            vtc_backup::server::run(std::sync::Arc::new(service), host, port, cors).await?;
        }
    }

    Ok(())
}

async fn open_service(settings: Settings) -> Result<BackupService> {
    let store = open_store(&settings).await.map_err(coded)?;
    Ok(BackupService::with_pg_tools(settings, store))
}

/// Attach the stable error code so it shows up first in the report
fn coded(err: BackupError) -> anyhow::Error {
    let code = err.code();
    anyhow::Error::new(err).context(code)
}

async fn handle_backup(service: &BackupService, command: BackupCommands) -> Result<()> {
    match command {
        BackupCommands::Create { json } => {
            let kind = if json { BackupKind::Json } else { BackupKind::Native };
            let created = service.create_backup_of_kind(kind).await.map_err(coded)?;

            match created.snapshot {
                Some(snapshot) => {
                    // Nowhere to store it; hand the document to the caller
                    eprintln!(
                        "{} restricted environment, writing {} to stdout",
                        "!".yellow(),
                        created.artifact.name
                    );
                    println!("{}", snapshot.to_json_pretty().map_err(coded)?);
                }
                None => {
                    println!(
                        "{} Created {} ({})",
                        "✓".green(),
                        created.artifact.name.bold(),
                        created.artifact.size_display()
                    );
                }
            }
        }
        BackupCommands::List => {
            let listing = service.list().await.map_err(coded)?;

            if let Some(note) = &listing.note {
                println!("{}", note.yellow());
            }
            if listing.artifacts.is_empty() {
                println!("No backups found");
                return Ok(());
            }

            println!("{:<44} {:<8} {:>10}  {}", "NAME", "KIND", "SIZE", "CREATED");
            for artifact in &listing.artifacts {
                let kind = match artifact.kind {
                    BackupKind::Native => "native",
                    BackupKind::Json => "json",
                };
                println!(
                    "{:<44} {:<8} {:>10}  {}",
                    artifact.name,
                    kind,
                    artifact.size_display(),
                    artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        BackupCommands::Delete { name } => {
            service.delete(&name).await.map_err(coded)?;
            println!("{} Deleted {}", "✓".green(), name);
        }
        BackupCommands::Restore { name, file } => {
            let source = match (name, file) {
                (Some(name), _) => RestoreSource::Stored { name },
                (None, Some(path)) => RestoreSource::Inline(read_document(&path).await?),
                (None, None) => anyhow::bail!("Provide a backup name or --file"),
            };

            let result = service.restore(source).await.map_err(coded)?;
            println!("{} Restored from {}", "✓".green(), result.source.bold());
            for (kind, count) in &result.per_entity_counts {
                println!("  {:<10} {}", kind.to_string(), count);
            }
            if matches!(result.kind, BackupKind::Json) {
                println!("  {:<10} {}", "total", result.total_records);
            }
        }
        BackupCommands::Export { out } => {
            let snapshot = service.export_snapshot().await.map_err(coded)?;
            let body = snapshot.to_json_pretty().map_err(coded)?;
            tokio::fs::write(&out, body)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;

            println!(
                "{} Exported {} records to {}",
                "✓".green(),
                snapshot.entities.total(),
                out.display()
            );
            for kind in INSERT_ORDER {
                println!("  {:<10} {}", kind.to_string(), snapshot.entities.len_of(kind));
            }
        }
    }

    Ok(())
}

async fn read_document(path: &Path) -> Result<serde_json::Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn handle_env(settings: &Settings) {
    let environment = vtc_backup::core::RuntimeEnvironment::classify(settings);

    let label = if environment.is_restricted() {
        "restricted".yellow()
    } else {
        "unrestricted".green()
    };
    println!("Environment: {}", label);

    for marker in SERVERLESS_MARKERS {
        if let Some(value) = settings.get(marker) {
            println!("  {} = {}", marker, value);
        }
    }

    println!("Backups directory: {}", settings.backup_dir().display());
    println!(
        "Native tools: {} / {}",
        settings.pg_dump_bin(),
        settings.pg_restore_bin()
    );
    let direct = if settings.direct_url().is_some() { "set".green() } else { "missing".red() };
    println!("DIRECT_URL: {}", direct);
}

fn handle_config(settings: &Settings, command: ConfigCommands) {
    match command {
        ConfigCommands::View => {
            println!("Configuration:\n");
            for key in settings.keys() {
                if let Some(value) = settings.get(&key) {
                    // Mask sensitive values
                    let display_value = if key.contains("URL") || key.contains("TOKEN") {
                        "****"
                    } else {
                        value
                    };
                    println!("{}: {}", key, display_value);
                }
            }
        }
        ConfigCommands::Validate => {
            let errors = settings.validate();

            if errors.is_empty() {
                println!("{} Configuration is valid", "✓".green());
            } else {
                println!("{} Configuration errors:", "✗".red());
                for error in errors {
                    println!("  - {}", error);
                }
            }
        }
    }
}
