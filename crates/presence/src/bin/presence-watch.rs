//! Connects a presence channel with settings from the environment and logs
//! every event until Ctrl-C.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carelink_presence::{ChannelEvent, PresenceChannel, PresenceConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carelink_presence=debug,presence_watch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = match PresenceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid presence configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        base_url = %config.base_url,
        namespace = %config.namespace,
        user_id = ?config.user_id,
        "Loaded presence configuration",
    );

    // --- Channel ---
    let channel = match PresenceChannel::builder(config)
        .on_force_leave(|signal| {
            tracing::warn!(
                appointment_id = %signal.appointment_id,
                ended_by = %signal.ended_by,
                "Call ended by the other participant",
            );
        })
        .build()
    {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build presence channel");
            return ExitCode::FAILURE;
        }
    };

    let mut events = channel.subscribe();
    channel.connect().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl-C, tearing down");
                break;
            }
            event = events.recv() => match event {
                Ok(ChannelEvent::UserStatusUpdated(update)) => {
                    tracing::info!(
                        user_id = %update.user_id,
                        is_blocked = channel.is_blocked(&update.user_id),
                        "Block status changed",
                    );
                }
                Ok(ChannelEvent::ReconnectFailed { attempts }) => {
                    tracing::error!(attempts, "Gave up reconnecting; live updates stopped");
                    break;
                }
                Ok(other) => {
                    tracing::info!(event = other.name(), ?other, "Presence event");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    channel.teardown().await;
    tracing::info!(known_users = channel.block_status().len(), "Shutdown complete");
    ExitCode::SUCCESS
}
