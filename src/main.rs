//! Demo binary: synchronize one tab with a directory and log what happens.
//!
//! Run with a directory argument (defaults to the current directory), then
//! create, edit or delete recognized files in it and watch the model
//! follow. Ctrl+C exits.

use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tabsync::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tabsync=debug".parse()?),
        )
        .init();

    let watch_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap());

    println!("=== tabsync demo ===\n");
    println!("Synchronizing tab \"demo\" with {}\n", watch_path.display());

    let mut settings = SyncSettings::default();
    settings.insert_tab("demo", watch_path.to_string_lossy());

    let mut loader = SyncLoader::new().with_debounce_ms(500);
    loader.load_settings(&settings);

    let model = TabModel::new("demo", 100).into_shared();
    let mut manifest = Cursor::new(Vec::new());
    loader.create_tab(&model, &mut manifest)?;

    if let Some(watcher) = loader.watcher_for(&model) {
        let mut updates = watcher.subscribe();
        tokio::spawn(async move {
            while let Ok(update) = updates.recv().await {
                println!(
                    "[sync] {:?} pass covered {} path(s)",
                    update.direction,
                    update.paths.len()
                );
            }
        });
    }

    println!("Found {} item(s).", model.read().unwrap().row_count());
    println!("Create or edit files in the directory; Ctrl+C exits.\n");

    let mut last_count = model.read().unwrap().row_count();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                loader.pump();
                let count = model.read().unwrap().row_count();
                if count != last_count {
                    println!("[model] {last_count} -> {count} item(s)");
                    for item in model.read().unwrap().items().take(5) {
                        let name = item.meta.base_name.as_deref().unwrap_or("<unnamed>");
                        println!("        - {name} ({} payload(s))", item.payload.len());
                    }
                    last_count = count;
                }
            }
        }
    }

    Ok(())
}
