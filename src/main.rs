//! Tenantpool - Tenant-Aware Connection Pool Manager
//!
//! Runs a simulated multi-tenant workload against the pool using the
//! in-memory backend and prints the resulting statistics.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tenantpool::adapter::RequestAdapter;
use tenantpool::config::{load_config, Config};
use tenantpool::helper::RetryConfig;
use tenantpool::pool::{MemoryConnectionFactory, PoolManager};
use tenantpool::tenant::{TaskLocalTenantProvider, TenantContext, DEFAULT_ALIAS};
use tokio::task::JoinSet;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

type Adapter = RequestAdapter<MemoryConnectionFactory, TaskLocalTenantProvider>;

/// Tenantpool - tenant-aware database connection pool
#[derive(Parser, Debug)]
#[command(name = "tenantpool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 8)]
    workers: usize,

    /// Requests issued by each worker
    #[arg(short, long, default_value_t = 100)]
    requests: usize,

    /// Number of distinct tenants
    #[arg(short, long, default_value_t = 4)]
    tenants: usize,

    /// Database alias the tenants live in
    #[arg(short, long, default_value = DEFAULT_ALIAS)]
    alias: String,

    /// Run the background cleanup monitor
    #[arg(long)]
    monitor: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };

    info!("Tenantpool v{}", tenantpool::VERSION);
    info!(
        max_connections = config.pool.max_connections,
        workers = args.workers,
        requests = args.requests,
        tenants = args.tenants,
        "Starting workload"
    );

    let factory = Arc::new(MemoryConnectionFactory::new());
    let pool = Arc::new(PoolManager::new(config.pool, factory.clone())?);
    let monitor = args.monitor.then(|| pool.spawn_monitor());

    let adapter = Arc::new(
        RequestAdapter::new(pool.clone(), TaskLocalTenantProvider, args.alias.clone())
            .with_retry(RetryConfig::default()),
    );

    tokio::select! {
        _ = run_workload(adapter.clone(), &args) => {
            info!("Workload finished");
        }
        _ = shutdown_signal() => {}
    }

    let stats = pool.stats();
    let timings = adapter.timings();
    info!(
        total_requests = stats.total_requests,
        peak = stats.peak_connections,
        reused = stats.reuse_count,
        recycled = stats.recycled_count,
        errors = stats.connection_errors,
        timeouts = stats.connection_timeouts,
        avg_wait = ?stats.average_wait_time,
        avg_lifetime = ?stats.average_connection_lifetime,
        "Pool statistics"
    );
    for (tenant, count) in &stats.tenant_connection_counts {
        info!(tenant = %tenant, live = count, "Tenant connections");
    }
    info!(
        handled = timings.requests,
        failed = timings.failed,
        slowest = ?timings.slowest,
        average = ?timings.average(),
        "Request timings"
    );

    pool.close().await;
    if let Some(monitor) = monitor {
        if let Err(e) = monitor.await {
            warn!("Monitor task failed: {}", e);
        }
    }
    info!(open = factory.open_connections(), "Shutdown complete");

    Ok(())
}

/// Issue `requests` requests from each of `workers` tasks
async fn run_workload(adapter: Arc<Adapter>, args: &Args) {
    let mut tasks = JoinSet::new();
    let tenants = args.tenants.max(1);

    for worker in 0..args.workers {
        let adapter = adapter.clone();
        let alias = args.alias.clone();
        let requests = args.requests;

        tasks.spawn(async move {
            for request in 0..requests {
                let tenant = (worker + request) % tenants;
                let context = TenantContext::new(format!("tenant{}", tenant), alias.clone())
                    .with_schema(format!("tenant_{}", tenant));

                let result = TaskLocalTenantProvider::scope(
                    context,
                    adapter.handle(|conn| async move {
                        conn.execute("SELECT 1")?;
                        tokio::task::yield_now().await;
                        Ok(())
                    }),
                )
                .await;

                if let Err(e) = result {
                    warn!(worker, request, "Request failed: {:#}", e);
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Worker task failed: {}", e);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
            }
            Err(e) => {
                warn!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
