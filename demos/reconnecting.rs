//! Keep a WebSocket connection alive and log its lifecycle.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,resilient_ws=debug cargo run --example reconnecting --features tracing -- wss://ws.postman-echo.com/raw
//! ```
//!
//! The endpoint can also come from `WS_ENDPOINT`. Optionally log to a file:
//! ```sh
//! LOG_FILE=reconnecting.log RUST_LOG=info cargo run --example reconnecting --features tracing
//! ```

use std::fs::File;
use std::time::Duration;

use resilient_ws::{Callbacks, Config, ConnectionManager, ReconnectConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_ENDPOINT: &str = "wss://ws.postman-echo.com/raw";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WS_ENDPOINT").ok())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());

    let config = Config::builder()
        .endpoint(endpoint)
        .ping_interval(Duration::from_secs(5))
        .pong_timeout(Duration::from_secs(3))
        .reconnect(
            ReconnectConfig::builder()
                .delay(Duration::from_secs(1))
                .max_attempts(5)
                .notify_exhausted(true)
                .build(),
        )
        .build();

    let callbacks = Callbacks::default()
        .opened(|| info!("connected"))
        .closed(|reason| info!(?reason, "closed"))
        .errored(|error| warn!(%error, "transport error"))
        .message_received(|payload| info!(?payload, "message"))
        .reconnecting(|attempt| info!(attempt, "reconnecting"))
        .exhausted(|attempts| warn!(attempts, "giving up"));

    let connection = match ConnectionManager::connect(config, callbacks) {
        Ok(connection) => connection,
        Err(e) => {
            warn!(error = %e.error(), "first connection attempt failed, retrying");
            e.into_manager().ok_or_else(|| anyhow::anyhow!("invalid configuration"))?
        }
    };

    connection.wait_connected().await;
    connection.send("hello")?;

    let mut state = connection.state_receiver();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                info!(state = ?*state.borrow_and_update(), "state changed");
            }
        }
    }

    connection.close();
    connection.wait_closed().await;
    info!("done");

    Ok(())
}
