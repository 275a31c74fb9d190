//! relaycastd - anonymous relay/broadcast bot daemon.

use relaycast::config::Config;
use relaycast::handlers::{App, Dispatcher};
use relaycast::store::Database;
use relaycast::transport::{ChatTransport, TelegramTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command menu registered with the chat service on startup.
const COMMANDS: &[(&str, &str)] = &[
    ("start", "Start"),
    ("settings", "Settings"),
    ("del", "Delete message"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        operator_id = config.bot.operator_id,
        cooldown_secs = config.relay.cooldown_secs,
        "Starting relaycastd"
    );

    // Initialize database
    let db_path = config
        .database
        .as_ref()
        .map(|d| d.path.as_str())
        .unwrap_or("relaycast.db");
    let db = Database::new(db_path).await?;

    let transport = Arc::new(TelegramTransport::new(
        &config.bot.token,
        Duration::from_secs(config.relay.poll_timeout_secs),
    )?);

    // The operator is always an admin directory entry
    db.users().set_admin(config.bot.operator_id, true).await?;

    if let Err(e) = transport.set_my_commands(COMMANDS).await {
        warn!(error = %e, "Failed to register command menu");
    }
    if let Err(e) = transport
        .send_message(config.bot.operator_id, "Bot started", None)
        .await
    {
        warn!(error = %e, "Failed to notify operator of startup");
    }

    let app = Arc::new(App::new(
        db.clone(),
        transport.clone(),
        config.relay.cooldown_secs,
    ));
    let dispatcher = Dispatcher::new(app);

    info!("Entering event loop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            polled = transport.poll_updates() => {
                match polled {
                    Ok(events) => {
                        // Events are independent; handle each concurrently
                        for event in events {
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move { dispatcher.dispatch(event).await });
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Polling failed, backing off");
                        tokio::time::sleep(Duration::from_secs(3)).await;
                    }
                }
            }
        }
    }

    if let Err(e) = transport
        .send_message(config.bot.operator_id, "Bot stopped", None)
        .await
    {
        warn!(error = %e, "Failed to notify operator of shutdown");
    }
    db.close().await;
    info!("Shutdown complete");
    Ok(())
}
