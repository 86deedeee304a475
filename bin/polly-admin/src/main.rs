//! Polly Admin - Command Line Interface
//!
//! This binary drives the overlay store and the volume reconciler directly:
//! store maintenance plus the volume list, inspect, offer, revoke, label and
//! lifecycle commands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polly_common::{Config, CreateVolumeRequest, ServiceConfig, Volume, parse_label};
use polly_meta_store::{Category, MetaStore};
use polly_volumes::{MockProvider, VolumeFilter, VolumeReconciler};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "polly-admin")]
#[command(about = "Polly volume overlay admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/polly/polly.toml", env = "POLLY_CONFIG")]
    config: String,

    /// Store backend (redb, boltdb, memory)
    #[arg(long)]
    backend: Option<String>,

    /// Store endpoint (database file for redb)
    #[arg(long)]
    endpoint: Option<String>,

    /// Root path of every store key
    #[arg(long)]
    root: Option<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Overlay store maintenance
    Store {
        #[command(subcommand)]
        action: StoreCommands,
    },
    /// Volume operations
    Volume {
        #[command(subcommand)]
        action: VolumeCommands,
    },
}

#[derive(Subcommand, Debug)]
enum StoreCommands {
    /// Erase every record, or a single category
    Erase {
        /// Category (fields, internal, admin, snapshot)
        #[arg(long)]
        category: Option<String>,
    },
    /// List registered volume ids
    Ids,
    /// Show the store schema version
    Version,
}

#[derive(Subcommand, Debug)]
enum VolumeCommands {
    /// List volumes
    List {
        /// Include volumes without an overlay record, registering them
        #[arg(short, long)]
        all: bool,
        /// Filter term (key=value), repeatable
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },
    /// Show volume details
    Inspect {
        /// Volume ID (service-volume)
        volume_id: String,
    },
    /// Offer a volume to schedulers, replacing the current set
    Offer {
        /// Volume ID (service-volume)
        volume_id: String,
        /// Scheduler names
        #[arg(required = true)]
        schedulers: Vec<String>,
    },
    /// Revoke a volume from schedulers
    Revoke {
        /// Volume ID (service-volume)
        volume_id: String,
        /// Scheduler names
        #[arg(required = true)]
        schedulers: Vec<String>,
    },
    /// Add or overwrite labels (key=value)
    Label {
        /// Volume ID (service-volume)
        volume_id: String,
        #[arg(required = true)]
        labels: Vec<String>,
    },
    /// Remove labels by key
    Unlabel {
        /// Volume ID (service-volume)
        volume_id: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Create a volume and register its overlay
    Create {
        /// Volume name
        name: String,
        /// Owning service
        #[arg(short, long)]
        service: String,
        /// Size in GiB
        #[arg(long, default_value_t = 0)]
        size: i64,
        #[arg(long, default_value_t = 0)]
        iops: i64,
        /// Volume type
        #[arg(long = "type", default_value = "")]
        volume_type: String,
        #[arg(long, default_value = "")]
        availability_zone: String,
        /// Scheduler to offer the volume to, repeatable
        #[arg(long = "scheduler")]
        schedulers: Vec<String>,
        /// Label (key=value), repeatable
        #[arg(long = "label")]
        labels: Vec<String>,
    },
    /// Remove a volume and its overlay
    Remove {
        /// Volume ID (service-volume)
        volume_id: String,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config =
        Config::load(&args.config).with_context(|| format!("loading {}", args.config))?;

    // CLI flags take precedence over the file
    if let Some(backend) = &args.backend {
        config.store.backend.clone_from(backend);
    }
    if let Some(endpoint) = &args.endpoint {
        config.store.endpoints = vec![endpoint.clone()];
    }
    if let Some(root) = &args.root {
        config.store.root.clone_from(root);
    }
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    if config.services.is_empty() {
        config.services.push(ServiceConfig {
            name: "mock".to_string(),
            driver: "mock".to_string(),
        });
    }
    Ok(config)
}

fn parse_filter(terms: &[String]) -> Result<VolumeFilter> {
    let pairs = terms
        .iter()
        .map(|t| parse_label(t).with_context(|| format!("invalid filter term '{t}', want key=value")))
        .collect::<Result<Vec<_>>>()?;
    Ok(VolumeFilter::from_pairs(pairs))
}

fn parse_labels(labels: &[String]) -> Result<HashMap<String, String>> {
    labels
        .iter()
        .map(|l| parse_label(l).with_context(|| format!("invalid label '{l}', want key=value")))
        .collect()
}

fn print_volumes(volumes: &[Volume], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(volumes)?);
        return Ok(());
    }

    println!("Volumes");
    println!("=======");
    if volumes.is_empty() {
        println!("No volumes found");
        return Ok(());
    }
    println!(
        "{:<28} {:<20} {:<8} {:<8} {:<24} {:<6}",
        "VOLUME ID", "NAME", "SIZE", "IOPS", "SCHEDULERS", "LABELS"
    );
    println!("{}", "-".repeat(98));
    for vol in volumes {
        let schedulers = if vol.schedulers.is_empty() {
            "-".to_string()
        } else {
            vol.schedulers.join(",")
        };
        println!(
            "{:<28} {:<20} {:<8} {:<8} {:<24} {:<6}",
            vol.overlay_id,
            vol.external.name,
            vol.external.size,
            vol.external.iops,
            schedulers,
            vol.labels.len(),
        );
    }
    Ok(())
}

fn print_volume(vol: &Volume, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(vol)?);
        return Ok(());
    }

    println!("Volume: {}", vol.overlay_id);
    println!("========{}", "=".repeat(vol.overlay_id.as_str().len()));
    println!("Service:           {}", vol.service_name);
    println!("External ID:       {}", vol.external.id);
    println!("Name:              {}", vol.external.name);
    println!("Size:              {} GiB", vol.external.size);
    println!("IOPS:              {}", vol.external.iops);
    println!(
        "Type:              {}",
        if vol.external.volume_type.is_empty() { "-" } else { &vol.external.volume_type }
    );
    println!(
        "Availability Zone: {}",
        if vol.external.availability_zone.is_empty() { "-" } else { &vol.external.availability_zone }
    );
    println!(
        "Schedulers:        {}",
        if vol.schedulers.is_empty() { "-".to_string() } else { vol.schedulers.join(", ") }
    );
    if !vol.labels.is_empty() {
        println!();
        println!("Labels:");
        let mut labels: Vec<_> = vol.labels.iter().collect();
        labels.sort();
        for (key, value) in labels {
            println!("  {key} = {value}");
        }
    }
    Ok(())
}

fn run_store(store: &MetaStore, action: StoreCommands, json: bool) -> Result<()> {
    match action {
        StoreCommands::Erase { category } => {
            if let Some(category) = category {
                let category: Category = category.parse().map_err(anyhow::Error::msg)?;
                store.erase_category(category)?;
                println!("Category '{category}' erased");
            } else {
                store.erase_store()?;
                println!("Store erased");
            }
        }
        StoreCommands::Ids => {
            let ids = store.volume_ids()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else if ids.is_empty() {
                println!("No volumes registered");
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
        }
        StoreCommands::Version => {
            let version = store.version()?;
            if json {
                println!("{}", serde_json::json!({ "version": version }));
            } else {
                println!("Store version: {version}");
            }
        }
    }
    Ok(())
}

fn run_volume(reconciler: &VolumeReconciler, action: VolumeCommands, json: bool) -> Result<()> {
    match action {
        VolumeCommands::List { all, filters } => {
            let filter = parse_filter(&filters)?;
            let volumes = if all {
                reconciler.list_all(&filter)?
            } else {
                reconciler.list(&filter)?
            };
            print_volumes(&volumes, json)?;
        }
        VolumeCommands::Inspect { volume_id } => {
            print_volume(&reconciler.inspect(&volume_id)?, json)?;
        }
        VolumeCommands::Offer { volume_id, schedulers } => {
            print_volume(&reconciler.offer(&volume_id, &schedulers)?, json)?;
        }
        VolumeCommands::Revoke { volume_id, schedulers } => {
            print_volume(&reconciler.revoke(&volume_id, &schedulers)?, json)?;
        }
        VolumeCommands::Label { volume_id, labels } => {
            let labels = parse_labels(&labels)?;
            print_volume(&reconciler.label(&volume_id, &labels)?, json)?;
        }
        VolumeCommands::Unlabel { volume_id, keys } => {
            print_volume(&reconciler.labels_remove(&volume_id, &keys)?, json)?;
        }
        VolumeCommands::Create {
            name,
            service,
            size,
            iops,
            volume_type,
            availability_zone,
            schedulers,
            labels,
        } => {
            let request = CreateVolumeRequest {
                service_name: service,
                name,
                volume_type,
                size,
                iops,
                availability_zone,
                schedulers,
                labels: parse_labels(&labels)?,
                ..CreateVolumeRequest::default()
            };
            let vol = reconciler.create(&request)?;
            if !json {
                println!("Volume created successfully!");
                println!();
            }
            print_volume(&vol, json)?;
        }
        VolumeCommands::Remove { volume_id } => {
            reconciler.remove(&volume_id)?;
            println!("Volume '{volume_id}' removed successfully");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = Arc::new(MetaStore::open(&config.store).context("opening overlay store")?);
    info!(
        "Using {} store, root '{}'",
        store.backend_name(),
        config.store.root
    );

    match args.command {
        Commands::Store { action } => run_store(&store, action, args.json),
        Commands::Volume { action } => {
            let provider = Arc::new(MockProvider::from_config(&config.services)?);
            let reconciler = VolumeReconciler::new(provider, store);
            run_volume(&reconciler, action, args.json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(&["size=10".to_string(), "tier=gold".to_string()]).unwrap();
        assert!(!filter.is_empty());
        assert!(parse_filter(&["size".to_string()]).is_err());
        assert!(parse_filter(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(&["tier=gold".to_string(), "note=".to_string()]).unwrap();
        assert_eq!(labels["tier"], "gold");
        assert_eq!(labels["note"], "");

        let err = parse_labels(&["tier=gold".to_string(), "tier".to_string()]).unwrap_err();
        assert!(err.to_string().contains("invalid label 'tier'"));
        assert!(parse_labels(&["=gold".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses_volume_offer() {
        let args = Args::try_parse_from([
            "polly-admin",
            "--backend",
            "memory",
            "volume",
            "offer",
            "mock-vol-000",
            "mesos",
            "k8s",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.services[0].name, "mock");
        assert!(matches!(
            args.command,
            Commands::Volume {
                action: VolumeCommands::Offer { ref schedulers, .. }
            } if schedulers.len() == 2
        ));
    }
}
