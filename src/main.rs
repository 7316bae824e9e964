use std::sync::Arc;

use anyhow::Context;
use spatial_action::client::{HttpDeviceApi, ResilientClient, RetryPolicy};
use spatial_action::config::AppConfig;
use spatial_action::dispatch::DeviceDispatcher;
use spatial_action::query::{PgSpatialStore, QueryCompiler, QueryService, QueryValidator};
use spatial_action::tools::SpatialTools;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries tool responses, so logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    config.validate()?;

    info!("Spatial action layer starting");
    info!("  Device API: {}", config.device_api.endpoint);
    info!(
        "  Retry: {} attempts, backoff {:?}..{:?}",
        config.retry.max_attempts, config.retry.min_wait, config.retry.max_wait
    );

    let validator = Arc::new(QueryValidator::new().context("Failed to build query validator")?);
    let store = PgSpatialStore::connect_lazy(&config.database, validator.clone())?;
    let queries = QueryService::new(
        QueryCompiler::from_config(&config.query),
        validator,
        Arc::new(store),
    );

    let api = HttpDeviceApi::new(&config.device_api).context("Failed to build device API client")?;
    let client = ResilientClient::new(RetryPolicy::from(&config.retry));
    let dispatcher = DeviceDispatcher::new(Arc::new(api), client, config.dispatcher.clone());

    match dispatcher.health().await {
        Ok(_) => info!("Device API reachable"),
        Err(e) => warn!("Device API health check failed: {}", e),
    }

    let tools = SpatialTools::new(queries, dispatcher);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Serving tool calls on stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = tools.handle_line(&line).await;
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                if let Err(e) = stdout.write_all(out.as_bytes()).await {
                    error!("Failed to write response: {}", e);
                    break;
                }
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!(
        "Shutting down, {} commands tracked",
        tools.dispatcher().tracked_commands().await
    );
    Ok(())
}
