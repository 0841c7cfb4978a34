//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! GATEWAY_TOKEN=... cargo run -p shardgate-client
//! ```
//!
//! Configuration is loaded from environment variables. Every dispatch is
//! logged; Ctrl-C shuts all shards down with a normal closure.

use anyhow::Context;
use shardgate_client::{
    handler_fn, CoordinatorEvent, DispatchEvent, DispatchRouter, GatewayConfig, ShardCoordinator,
    WebSocketConnector,
};
use shardgate_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Tracing depends on APP_ENV, so read the environment first
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway client failed");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let gateway = GatewayConfig::from(&config);
    info!(
        app = %config.app.name,
        env = ?config.app.env,
        url = %gateway.url,
        shard_count = gateway.shard_count,
        intents = gateway.intents.bits(),
        "Configuration loaded"
    );

    let router = DispatchRouter::new();
    router.register_any(handler_fn(|event: DispatchEvent| async move {
        info!(
            shard_id = event.shard.id,
            event = %event.name,
            seq = ?event.sequence,
            "Dispatch received"
        );
        Ok(())
    }));

    let mut coordinator =
        ShardCoordinator::new(gateway, Arc::new(WebSocketConnector), Arc::new(router));
    let mut events = coordinator.start();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Some(CoordinatorEvent::ShardFatal { shard_id, rejection }) => {
                    error!(shard_id = shard_id, reason = %rejection, "Shard stopped by gateway");
                    if coordinator.health().fatally_closed == coordinator.shards().len() {
                        coordinator.shutdown().await;
                        anyhow::bail!("Every shard was rejected by the gateway");
                    }
                }
                Some(CoordinatorEvent::ShardStruggling { shard_id, attempts, cause }) => {
                    warn!(shard_id = shard_id, attempts = attempts, cause = %cause, "Shard struggling to reconnect");
                }
                None => break,
            }
        }
    }

    coordinator.shutdown().await;
    info!(health = ?coordinator.health(), "Gateway client stopped");
    Ok(())
}
