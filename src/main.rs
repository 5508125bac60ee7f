/// Media Service
///
/// Stores uploaded course and gallery media on local disk and serves it
/// back over HTTP.

mod api;
mod blob_store;
mod config;
mod context;
mod error;
mod metrics;
mod server;

use config::{LogFormat, ServerConfig};
use context::AppContext;
use error::MediaResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> MediaResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    init_tracing(config.logging.format);
    metrics::init();

    // Create application context; fails if the storage root is unusable
    let ctx = AppContext::new(config).await.map_err(|e| {
        tracing::error!(error = %e, "startup failed");
        e
    })?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "media_service=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
