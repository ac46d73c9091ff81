mod bootstrap;

use anyhow::Result;
use h2pc_core::config::{AppConfig, LoadOptions};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use h2pc_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.trim().to_ascii_lowercase()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    tracing::info!(
        event_name = "system.server.starting",
        version = env!("CARGO_PKG_VERSION"),
        messenger_kind = %config.messenger.kind()?,
        "h2pc agent starting"
    );

    let app = bootstrap::bootstrap_with_config(config).await?;
    tracing::info!(
        event_name = "system.server.started",
        topic_src = ?app.config.messenger.topic_src,
        topic_sink = ?app.config.messenger.topic_sink,
        src_count_min = app.config.messenger.src_count_min,
        sink_count_min = app.config.messenger.sink_count_min,
        "h2pc agent started"
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(()) => {
                tracing::info!(
                    event_name = "system.server.stopping",
                    "interrupt received; stopping agent"
                );
                shutdown.cancel();
            }
            Err(error) => tracing::error!(
                event_name = "system.server.signal_failed",
                error = %error,
                "could not listen for ctrl-c"
            ),
        }
    });

    app.agent_runtime.run(cancel).await?;

    tracing::info!(event_name = "system.server.stopped", "h2pc agent stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
