//! # Platform Chat Service
//!
//! Entry point for the real-time chat subsystem:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database connection pool and migrations
//! - HTTP API and WebSocket gateway

use anyhow::Result;
use tracing::info;

use platform_chat::config::Settings;
use platform_chat::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    platform_chat::telemetry::init_tracing();

    info!("Starting chat service...");

    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
