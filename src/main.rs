use anyhow::{Context, Result};
use memory_scan_core::config::{load_config, validate_config, Config};
use memory_scan_core::logging::init_logging;
use memory_scan_core::memory::ProcessMemory;
use memory_scan_core::pointer::PointerResolver;
use memory_scan_core::scan::{SessionStore, WorkerPool};
use memory_scan_core::Handler;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().context("loading memory-scan.toml")?;
    validate_config(&config)?;
    init_logging(&config.logging).context("opening log file")?;

    info!("Starting memory-scan-core v{}", env!("CARGO_PKG_VERSION"));
    info!("Architecture: {}", std::env::consts::ARCH);

    let memory = attach()?;
    let handler = build_handler(&config, memory)?;

    let store = Arc::clone(handler.store());
    let interval = Duration::from_secs(config.session.eviction_interval_secs);
    let eviction = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle();
            if evicted > 0 {
                debug!(evicted, "Evicted idle sessions");
            }
        }
    });

    info!("Ready. Reading JSON requests from stdin, Ctrl+C to stop.");
    tokio::select! {
        result = serve(handler) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    eviction.abort();
    info!("Shutting down memory-scan-core");
    Ok(())
}

#[cfg(windows)]
fn attach() -> Result<Arc<dyn ProcessMemory>> {
    use memory_scan_core::memory::native::WindowsProcess;

    let pid: u32 = std::env::args()
        .nth(1)
        .context("usage: memory-scan-core <pid>")?
        .parse()
        .context("pid must be a decimal number")?;
    let process = WindowsProcess::open(pid)?;
    info!(pid, "Attached to target process");
    Ok(Arc::new(process))
}

#[cfg(not(windows))]
fn attach() -> Result<Arc<dyn ProcessMemory>> {
    anyhow::bail!("attaching to a live process is only supported on Windows")
}

fn build_handler(config: &Config, memory: Arc<dyn ProcessMemory>) -> Result<Handler> {
    let pool = Arc::new(WorkerPool::new(config.scanner.max_threads)?);
    let store = Arc::new(SessionStore::new(
        Arc::clone(&memory),
        Arc::clone(&pool),
        config.scan_settings(),
        config.store_limits(),
    ));
    let pointers = Arc::new(PointerResolver::new(memory, pool, config.pointer_settings()));
    Ok(Handler::new(store, pointers))
}

/// One request per line in, one reply per line out. Requests run
/// concurrently so a cancel can reach a scan that is still in flight.
async fn serve(handler: Handler) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(reply) = rx.recv().await {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let worker = handler.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || worker.handle_json(&line)).await {
                Ok(reply) => {
                    let _ = tx.send(reply);
                }
                Err(e) => error!(error = %e, "Request task failed"),
            }
        });
    }

    drop(tx);
    writer.await??;
    Ok(())
}
