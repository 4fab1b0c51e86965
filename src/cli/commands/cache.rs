//! Cache command - inspect and clear the file-backed cache store

use crate::cache::{format_bytes, CacheStore, FsCacheStore, StoredEntry, KEY_SEPARATOR};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::ShipwrightResult;
use crate::ui::{self, UiContext};
use console::style;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, manager: &ConfigManager, config: &Config) -> ShipwrightResult<()> {
    let store = FsCacheStore::new(manager.cache_dir(config));
    debug!("Cache store at {}", store.root().display());

    match args.action {
        CacheAction::List { format } => list_entries(&store, format).await,
        CacheAction::Clear { platform, yes } => clear_entries(&store, platform.as_deref(), yes).await,
    }
}

async fn list_entries(store: &FsCacheStore, format: OutputFormat) -> ShipwrightResult<()> {
    let entries = store.list().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table if entries.is_empty() => {
            println!("No cache entries in {}", store.root().display());
        }
        OutputFormat::Table => print_table(&entries),
    }
    Ok(())
}

fn print_table(entries: &[StoredEntry]) {
    println!("{:<60} {:>10} {:<20}", "KEY", "SIZE", "STORED");
    println!("{}", "-".repeat(92));

    for entry in entries {
        println!(
            "{:<60} {:>10} {:<20}",
            entry.key,
            format_bytes(entry.size_bytes),
            entry.stored_at.format("%Y-%m-%d %H:%M")
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!(
        "Total: {} entr{} ({})",
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
        format_bytes(total)
    );
}

/// Entries belonging to `platform`, or all of them
fn select_entries(entries: Vec<StoredEntry>, platform: Option<&str>) -> Vec<StoredEntry> {
    match platform {
        Some(platform) => {
            let prefix = format!("{platform}{KEY_SEPARATOR}");
            entries
                .into_iter()
                .filter(|e| e.key.starts_with(&prefix))
                .collect()
        }
        None => entries,
    }
}

async fn clear_entries(store: &FsCacheStore, platform: Option<&str>, yes: bool) -> ShipwrightResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let entries = select_entries(store.list().await?, platform);

    if entries.is_empty() {
        println!("No cache entries to clear.");
        return Ok(());
    }

    println!("This will remove {} cache entr{}:", entries.len(), if entries.len() == 1 { "y" } else { "ies" });
    for entry in &entries {
        println!("  {} {}", style("•").red(), entry.key);
    }
    println!();

    if !ui::confirm(&ctx, "Remove these entries?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut removed = 0;
    for entry in &entries {
        if store.remove(&entry.key).await? {
            removed += 1;
        }
    }

    ui::step_ok(&ctx, &format!("Cleared {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" }));
    Ok(())
}
