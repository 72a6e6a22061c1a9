use tokio_util::sync::CancellationToken;

use feed_fanout::app::{AppError, FeedApp};
use feed_fanout::config::AppConfig;
use feed_fanout::telemetry;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::load_validated()?;
    telemetry::init(&config.server);

    tracing::info!(
        environment = ?config.server.environment,
        role = ?config.server.role,
        storage = ?config.database.backend,
        broker = ?config.broker.backend,
        "Configuration loaded"
    );

    let app = FeedApp::build(config).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Received ctrl-c, shutting down");
        signal.cancel();
    });

    app.run(shutdown).await
}
