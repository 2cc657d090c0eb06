//! Index and watch commands

use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ResolvedSource};
use crate::indexer::{Indexer, ProjectScan};
use crate::store::IndexStore;

pub fn run(store: &IndexStore, config: &Config, reset: bool) -> Result<()> {
    if reset {
        let cleared = store.reset_checkpoints()?;
        println!("Cleared {} checkpoints, reindexing from scratch", cleared);
    }

    let sources = config.sources();
    if sources.is_empty() {
        println!("No sources configured. Check your configuration.");
        return Ok(());
    }

    for source in &sources {
        println!("📂 {} ({})", source.name, source.base_path.display());
        if !source.base_path.is_dir() {
            println!("   Not found, skipping");
            continue;
        }
        let scans = Indexer::new(store).index_root(&source.base_path, &source.provider);
        print_scans(&scans);
    }

    Ok(())
}

fn print_scans(scans: &[ProjectScan]) {
    for scan in scans {
        let mut line = format!(
            "   → {:<30} {} indexed, {} unchanged",
            scan.display_name, scan.files_indexed, scan.files_unchanged
        );
        if scan.files_failed > 0 {
            line.push_str(&format!(", {} failed", scan.files_failed));
        }
        if scan.messages_indexed > 0 {
            line.push_str(&format!(" (+{} msgs)", scan.messages_indexed));
        }
        println!("{}", line);
    }
    let messages: usize = scans.iter().map(|s| s.messages_indexed).sum();
    println!("   {} projects, {} new messages\n", scans.len(), messages);
}

/// Re-run the tree scan every `interval` until interrupted.
///
/// Passes run one at a time on a blocking thread, so a file is never indexed
/// by two passes at once.
pub async fn watch(db_path: PathBuf, sources: Vec<ResolvedSource>, interval: Duration) -> Result<()> {
    println!(
        "Watching {} sources every {}s (Ctrl-C to stop)",
        sources.len(),
        interval.as_secs()
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    watch_loop(interval, shutdown, move || index_pass(&db_path, &sources)).await
}

/// Run `pass` on every tick until `shutdown` resolves.
///
/// `shutdown` is polled for the whole loop, including while a pass is in
/// flight. An interrupted pass is left to finish on its blocking thread.
async fn watch_loop<S, P>(interval: Duration, shutdown: S, pass: P) -> Result<()>
where
    S: Future<Output = ()>,
    P: Fn() -> Result<usize> + Send + Sync + 'static,
{
    tokio::pin!(shutdown);
    let pass = Arc::new(pass);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pass = Arc::clone(&pass);
                let running = tokio::task::spawn_blocking(move || pass());
                tokio::select! {
                    joined = running => {
                        let messages = joined.context("Index pass panicked")??;
                        if messages > 0 {
                            println!("Indexed {} new messages", messages);
                        }
                    }
                    _ = &mut shutdown => {
                        tracing::info!("Interrupted during an index pass, stopping watch");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Interrupted, stopping watch");
                break;
            }
        }
    }

    Ok(())
}

fn index_pass(db_path: &std::path::Path, sources: &[ResolvedSource]) -> Result<usize> {
    let store = IndexStore::open(db_path)
        .with_context(|| format!("Failed to open index at {}", db_path.display()))?;
    let indexer = Indexer::new(&store);
    let mut messages = 0;
    for source in sources.iter().filter(|s| s.base_path.is_dir()) {
        messages += indexer
            .index_root(&source.base_path, &source.provider)
            .iter()
            .map(|s| s.messages_indexed)
            .sum::<usize>();
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn test_shutdown_interrupts_running_pass() {
        let started = Instant::now();
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        watch_loop(Duration::from_secs(60), shutdown, || {
            std::thread::sleep(Duration::from_secs(1));
            Ok(0)
        })
        .await
        .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_passes_repeat_until_shutdown() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);
        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        watch_loop(Duration::from_millis(10), shutdown, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        })
        .await
        .unwrap();
        assert!(passes.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failed_pass_ends_watch() {
        let shutdown = std::future::pending::<()>();
        let result = watch_loop(Duration::from_millis(10), shutdown, || {
            Err(anyhow::anyhow!("index unavailable"))
        })
        .await;
        assert!(result.is_err());
    }
}
