use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use loupe_ingest::ServerConfig;
use loupe_retention::RetentionEngine;
use loupe_store::Store;
use loupe_telemetry::{init_telemetry, TelemetryConfig};
use loupe_tools::{serve_stdio, ToolContext};

/// Local browser-debugging bridge server: ingest listener + admin HTTP
/// surface + retention sweep + stdio tool runtime, one process
/// (spec.md §1, §2).
#[derive(Parser, Debug)]
#[command(name = "loupe-server", about = "Local browser-debugging bridge")]
struct Cli {
    /// Port the ingest/admin listener binds (env: LOUPE_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding the database and snapshot assets (env: LOUPE_DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Redact payloads even for sessions that didn't request safe mode.
    #[arg(long)]
    redaction_safe_mode: bool,
}

const RETENTION_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(loupe_telemetry::data_dir);
    std::fs::create_dir_all(&data_dir)
        .unwrap_or_else(|e| panic!("failed to create data dir {}: {e}", data_dir.display()));

    let _telemetry = init_telemetry(TelemetryConfig {
        log_db_path: data_dir.join("loupe-logs.db"),
        ..Default::default()
    });
    info!("starting loupe-server");

    let db_path = data_dir.join("browser-debug.db");
    let store = Store::open(&db_path).expect("failed to open database");

    let port = cli
        .port
        .or_else(|| std::env::var("LOUPE_PORT").ok().and_then(|s| s.parse().ok()))
        .unwrap_or_default();
    let config = ServerConfig {
        port: if port == 0 { ServerConfig::default().port } else { port },
        redaction_safe_mode: cli.redaction_safe_mode,
    };

    let ingest = loupe_ingest::start(config, store.clone())
        .await
        .expect("failed to start ingest listener");
    info!(port = ingest.port, "ingest listener ready");

    let shutdown = CancellationToken::new();
    let retention_task = spawn_retention_task(store.clone(), shutdown.clone());

    let tool_ctx = ToolContext::new(ingest.ctx.clone());
    let tool_shutdown = shutdown.clone();
    let tool_task = tokio::spawn(async move {
        tokio::select! {
            _ = tool_shutdown.cancelled() => {}
            result = serve_stdio(&tool_ctx, tokio::io::stdin(), tokio::io::stdout()) => {
                if let Err(e) = result {
                    error!(error = %e, "stdio tool transport exited");
                }
            }
        }
    });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("shutdown signal received, draining");
    shutdown.cancel();
    ingest.shutdown();
    ingest.drain().await;
    let _ = retention_task.await;
    let _ = tool_task.await;
}

/// Runs the retention pass on `RETENTION_POLL_INTERVAL`, skipping ticks
/// until `ServerSettings.cleanup_interval_minutes` has actually elapsed
/// (spec.md §4.4).
fn spawn_retention_task(store: Store, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let engine = RetentionEngine::new(store.clone());
        let mut interval = tokio::time::interval(RETENTION_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let now = loupe_ingest::now_ms();
                    let settings = match store.settings().get() {
                        Ok(s) => s,
                        Err(e) => {
                            error!(error = %e, "failed to load retention settings");
                            continue;
                        }
                    };
                    if !engine.due(&settings, now) {
                        continue;
                    }
                    match engine.run_pass(now) {
                        Ok(report) => info!(?report, "retention pass complete"),
                        Err(e) => error!(error = %e, "retention pass failed"),
                    }
                }
            }
        }
    })
}
