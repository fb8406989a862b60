use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskq_broker::{Broker, QueueMetrics, RouteTable, TrackingStore};
use taskq_server::api::{router, AppState};
use taskq_server::auth::AuthGate;
use taskq_server::config::ServerConfig;
use taskq_server::service::TaskService;
use taskq_worker::{HandlerRegistry, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "taskqd")]
#[command(about = "Asynchronous task execution and tracking service", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// HTTP bind host
    #[arg(long)]
    host: Option<String>,

    /// HTTP bind port
    #[arg(long)]
    port: Option<u16>,

    /// Number of worker executors
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = if std::path::Path::new(&args.config).exists() {
        ServerConfig::from_file(&args.config)?
    } else {
        tracing::warn!("Config file not found, using defaults");
        ServerConfig::default()
    };

    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(workers) = args.workers {
        config.workers.count = workers;
    }

    tracing::info!(
        "Starting taskqd: {} workers, auth {}",
        config.workers.count,
        if config.auth.enabled { "enabled" } else { "disabled" }
    );

    let table = RouteTable::standard();
    let store = Arc::new(TrackingStore::new());
    let broker = Arc::new(Broker::new(&table));
    let metrics = Arc::new(QueueMetrics::new()?);

    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        broker.clone(),
        HandlerRegistry::standard(),
        metrics.clone(),
        config.to_pool_config(),
        table.queues(),
    ));
    pool.start();

    // Retention sweep for terminal records.
    {
        let store = store.clone();
        let retention = chrono::Duration::seconds(config.retention.retention_secs as i64);
        let interval = Duration::from_secs(config.retention.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired(retention);
            }
        });
    }

    let service = Arc::new(TaskService::new(
        table,
        store,
        broker.clone(),
        metrics.clone(),
    ));

    let app = router(AppState {
        service,
        metrics,
        gate: AuthGate::new(config.auth.enabled, &config.auth.secret),
    });

    let addr = format!("{}:{}", config.http.host, config.http.port);
    tracing::info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal");
        })
        .await?;

    broker.shutdown();
    pool.shutdown().await;

    Ok(())
}
