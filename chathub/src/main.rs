use anyhow::Result;
use clap::Parser;
use std::future::{Future, IntoFuture};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chathub_api::http::create_router;
use chathub_core::auth::JwtService;
use chathub_core::{logging, Config};
use chathub_fanout::{instance_group_id, FanoutConsumer, MessagePublisher, RoomHub};

/// Bound on connection draining after a shutdown signal. Live websocket
/// sessions never end on their own, so an unbounded drain would hang the
/// process forever with a single client connected.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "chathub", about = "Room-scoped websocket message hub")]
struct Args {
    /// Path to a configuration file (env vars override it)
    #[arg(long, env = "CHATHUB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration (fail fast on misconfigurations)
    let config = Config::load(args.config.as_deref())?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("ChatHub server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Construct explicitly owned resources: hub, log producer, log consumer
    let jwt_service = JwtService::new(config.jwt.secret.as_bytes());
    let hub = Arc::new(RoomHub::new());
    let publisher = Arc::new(MessagePublisher::new(
        &config.kafka.brokers,
        &config.kafka.topic,
    )?);

    // Each process gets its own consumer group so it sees the full stream
    let group_id = instance_group_id(&config.kafka.group_id);
    let consumer = FanoutConsumer::new(
        &config.kafka.brokers,
        &config.kafka.topic,
        &group_id,
        hub.clone(),
    )?;

    // 4. Start the fan-out consumer
    let shutdown = CancellationToken::new();
    let consumer_task = tokio::spawn(consumer.run(shutdown.clone()));

    // 5. Serve HTTP until a shutdown signal arrives, then drain connections
    //    for at most SHUTDOWN_GRACE before dropping the stragglers
    let app = create_router(hub, publisher, jwt_service);
    let listener = tokio::net::TcpListener::bind(config.http_address()).await?;
    info!("Listening on {}", config.http_address());

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()));
    serve_with_deadline(server.into_future(), &shutdown, SHUTDOWN_GRACE).await?;

    // 6. Stop the consumer and drain it. Cancel again for the path where the
    //    server returned on its own (cancellation is idempotent).
    info!("Shutting down...");
    shutdown.cancel();
    if let Err(e) = consumer_task.await {
        error!("Fan-out consumer task failed: {e}");
    }

    info!("Server exiting");
    Ok(())
}

/// Run the server future to completion, but once the shutdown token fires,
/// give the connection drain at most `grace` before abandoning it.
async fn serve_with_deadline<F>(
    server: F,
    shutdown: &CancellationToken,
    grace: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = server => result,
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("Drain deadline exceeded, dropping remaining connections");
            Ok(())
        }
    }
}

/// Wait for SIGINT/SIGTERM, then cancel the shared token so the fan-out
/// consumer stops immediately and the drain deadline starts counting.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_drain_deadline_bounds_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // A drain that never completes (e.g. a websocket session held open)
        // must still be cut off at the deadline
        let never_drains = std::future::pending::<std::io::Result<()>>();
        let result = serve_with_deadline(never_drains, &shutdown, SHUTDOWN_GRACE).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_completed_server_returns_without_waiting() {
        let shutdown = CancellationToken::new();

        let result = serve_with_deadline(async { Ok(()) }, &shutdown, SHUTDOWN_GRACE).await;
        assert!(result.is_ok());
    }
}
