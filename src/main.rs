//! HttpLogger - configurable HTTP echo/mock service

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use httplogger::config::{LogFormat, Settings};
use httplogger::router;
use httplogger::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "httplogger=info,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tokio::fs::create_dir_all(&settings.data_root)
        .await
        .with_context(|| format!("Failed to create data root {}", settings.data_root.display()))?;

    info!("HttpLogger v{} starting on {}", env!("CARGO_PKG_VERSION"), settings.listen_addr);
    info!("Data root: {} ({:?} partition)", settings.data_root.display(), settings.partition);
    info!("Config key: {}", settings.config_key);
    info!(
        "Stats lock: {} attempts every {:?}",
        settings.stats_lock.attempts, settings.stats_lock.interval
    );
    if let Some(dir) = &settings.static_dir {
        info!("Serving UI from {}", dir.display());
    }

    let listen_addr = settings.listen_addr;
    let app = router(AppState::new(settings));

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
