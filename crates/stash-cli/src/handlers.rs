//! Command handlers.

use crate::config::StashConfig;
use console::style;
use stash_cache::{ReqwestFetcher, Worker, open_storage};
use stash_proxy::AppState;
use stash_trace::storage_span;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, info, warn};
use url::Url;

fn build_worker(config: &StashConfig, origin: &Url) -> Result<Worker, Box<dyn std::error::Error>> {
    let storage = open_storage(&config.storage);
    let fetcher = Arc::new(ReqwestFetcher::new()?);
    Ok(Worker::new(&config.cache, origin, storage, fetcher)?)
}

/// Install, activate and serve until ctrl-c.
pub async fn serve(
    mut config: StashConfig,
    listen: Option<String>,
    origin: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(listen) = listen {
        config.listen = listen;
    }
    if let Some(origin) = origin {
        config.origin = origin;
    }

    let origin = config.origin_url()?;
    let worker = Arc::new(build_worker(&config, &origin)?);
    let (installed, activated) = stash_proxy::bootstrap(&worker).await?;
    println!(
        "{} Installed {} ({} entries) and {} ({} entries)",
        style("✓").green(),
        style(&installed.static_partition).bold(),
        installed.static_entries,
        style(&installed.dynamic_partition).bold(),
        installed.dynamic_entries
    );
    if !activated.deleted.is_empty() {
        println!(
            "{} Removed stale partitions: {}",
            style("i").blue(),
            activated.deleted.join(", ")
        );
    }

    let listener = TcpListener::bind(&config.listen).await?;
    println!(
        "{} Proxying {} on {}",
        style("▶").cyan(),
        style(&origin).bold(),
        listener.local_addr()?
    );

    let state = Arc::new(AppState::new(worker, origin));
    stash_proxy::serve(listener, state, shutdown_signal()).await?;

    println!("{} Stopped", style("✓").green());
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Run install and activate against the configured store.
pub async fn install(config: &StashConfig) -> Result<(), Box<dyn std::error::Error>> {
    let origin = config.origin_url()?;
    let worker = build_worker(config, &origin)?;

    println!(
        "Installing version {} from {}...",
        style(worker.version()).bold(),
        origin
    );
    let (installed, activated) = stash_proxy::bootstrap(&worker).await?;

    println!(
        "{} {}: {} entries",
        style("✓").green(),
        installed.static_partition,
        installed.static_entries
    );
    println!(
        "{} {}: {} entries",
        style("✓").green(),
        installed.dynamic_partition,
        installed.dynamic_entries
    );
    for name in &activated.created {
        println!("  created {}", name);
    }
    for name in &activated.deleted {
        println!("  deleted {}", style(name).dim());
    }
    Ok(())
}

/// List partitions in the configured store.
pub async fn list_partitions(config: &StashConfig) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&config.storage);
    let current = config.cache.partitions();

    let names = storage
        .partitions()
        .instrument(storage_span("list", "*"))
        .await?;
    if names.is_empty() {
        println!("{} No partitions", style("i").blue());
        return Ok(());
    }

    println!("Partitions ({}):", storage.name());
    for name in names {
        let entries = storage
            .keys(&name)
            .instrument(storage_span("keys", &name))
            .await?
            .len();
        let marker = if current.contains(&name) {
            style("*").green()
        } else {
            style(" ").dim()
        };
        println!("  {} {} ({} entries)", marker, name, entries);
    }
    Ok(())
}

/// Delete partitions, optionally only those matching a prefix.
pub async fn clear_partitions(
    config: &StashConfig,
    prefix: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&config.storage);
    let prefix = prefix.unwrap_or_default();

    match prefix.as_str() {
        "" => println!("Clearing all partitions..."),
        p => println!("Clearing partitions with prefix {}...", style(p).bold()),
    }

    let deleted = storage
        .delete_by_prefix(&prefix)
        .instrument(storage_span("clear", &prefix))
        .await?;
    for name in &deleted {
        println!("  deleted {}", name);
    }
    println!(
        "{} {} partition(s) cleared",
        style("✓").green(),
        deleted.len()
    );
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &StashConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Current configuration:");
    print!("{}", serde_yaml::to_string(config)?);
    println!("\nConfig file: {}", path.display());
    Ok(())
}

/// Set configuration.
pub fn set_config(path: &Path, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = StashConfig::load(path)?;
    config.set(key, value)?;
    config.save(path)?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
