//! gsctld — the game-server controller daemon.
//!
//! # Usage
//!
//! ```text
//! gsctld run --data-dir /var/lib/gsctl --cluster-url http://127.0.0.1:8001
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use gsctl_cluster::{ClusterApi, HttpCluster, MemoryCluster};
use gsctl_consumer::MemoryBroker;
use gsctl_core::JsonClient;
use gsctl_events::{LogSink, SharedSink, WebhookSink};
use gsctl_state::StateStore;
use gsctld::{Cli, Command, Components, Controller, LogFormat, RunArgs};

const DEFAULT_LOG_FILTER: &str = "info,gsctld=debug,gsctl=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            init_tracing(args.log_format);
            run(args).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    args.validate()?;
    info!("gsctl controller starting");

    // ── Infrastructure ─────────────────────────────────────────

    std::fs::create_dir_all(&args.data_dir)?;
    let db_path = args.data_dir.join("gsctl.redb");
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let cluster: Arc<dyn ClusterApi> = if args.dry_run_cluster {
        warn!("dry-run cluster: objects are kept in memory and never scheduled");
        Arc::new(MemoryCluster::new())
    } else {
        let mut client = JsonClient::new(&args.cluster_url)?;
        if let Some(path) = &args.cluster_token_file {
            let token = std::fs::read_to_string(path)?;
            client = client.with_bearer_token(token.trim());
        }
        info!(url = %args.cluster_url, namespace = %args.namespace, "cluster client configured");
        Arc::new(HttpCluster::new(client, args.namespace.clone()))
    };

    let sink: SharedSink = match &args.event_webhook {
        Some(url) => {
            info!(%url, "publishing events to webhook");
            Arc::new(WebhookSink::new(JsonClient::new(url)?))
        }
        None => {
            info!("no event webhook configured, events are logged");
            Arc::new(LogSink)
        }
    };

    let broker = MemoryBroker::new();

    let controller = Controller::new(
        Components {
            state,
            cluster,
            broker: Arc::new(broker.clone()),
            sink,
        },
        args.controller_settings(),
    )?;

    // Queues exist before the API accepts commands.
    for binding in controller.bindings() {
        broker.declare(&binding);
        info!(queue = %binding.queue, routing_key = %binding.routing_key, "queue declared");
    }

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = controller.spawn(shutdown_rx);

    // ── API server ─────────────────────────────────────────────

    let router = controller.router();
    let addr = SocketAddr::from(([0, 0, 0, 0], args.listen_port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for handle in handles {
        let _ = handle.await;
    }

    info!("gsctl controller stopped");
    Ok(())
}
