//! tool-relay binary.
//!
//! Runs the completion sweeper over the configured store until Ctrl-C. When
//! given a path to a recorded SSE transcript, replays it as one execution
//! first, dispatching its tool calls to the built-in `echo` tool.
//!
//! ```text
//! tool-relay [transcript.sse]
//! ```

use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use tool_relay::adapters::{
    decode_stream, InMemoryExecutionStore, RedisExecutionStore, RegistryToolExecutor,
    TracingConversationDriver, TracingStatusPublisher,
};
use tool_relay::application::ToolCallCoordinator;
use tool_relay::config::{AppConfig, StoreBackend, TelemetryConfig};
use tool_relay::ports::{ExecutionStateStore, ToolExecutionError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.telemetry);

    let store: Arc<dyn ExecutionStateStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryExecutionStore::new()),
        StoreBackend::Redis => Arc::new(RedisExecutionStore::connect(&config.store.redis).await?),
    };

    let mut registry = RegistryToolExecutor::new();
    registry.register_fn("echo", |arguments| {
        serde_json::to_value(arguments).map_err(|e| ToolExecutionError::SystemError(e.to_string()))
    });

    let coordinator = ToolCallCoordinator::new(
        config.coordinator.clone(),
        store,
        Arc::new(registry),
        Arc::new(TracingConversationDriver::new()),
        Arc::new(TracingStatusPublisher::new()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = coordinator.spawn_sweeper(shutdown_rx);
    tracing::info!(
        backend = ?config.store.backend,
        max_concurrent_tools = config.coordinator.max_concurrent_tools,
        "tool-relay started"
    );

    if let Some(path) = std::env::args().nth(1) {
        replay(&coordinator, &path).await?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown_tx.send(true)?;
    sweeper.await?;
    Ok(())
}

async fn replay(coordinator: &ToolCallCoordinator, path: &str) -> Result<(), BoxError> {
    let transcript = tokio::fs::read(path).await?;
    let execution_id = coordinator.begin_execution().await?;
    let chunks = futures::stream::iter([Ok::<_, std::io::Error>(transcript)]);

    match coordinator.process_stream(execution_id, decode_stream(chunks)).await {
        Ok(result) => tracing::info!(
            execution_id = %execution_id,
            dispatched = result.dispatched.len(),
            text_len = result.text().len(),
            "transcript replayed"
        ),
        Err(e) => tracing::error!(execution_id = %execution_id, error = %e, "transcript replay failed"),
    }
    Ok(())
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(telemetry.log_level.to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if telemetry.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
