#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

//! Connection lifecycle: heartbeat liveness detection and bounded reconnection.
//!
//! A [`ConnectionManager`] owns one transport at a time. A single background task processes
//! transport notifications, timer expirations and caller commands in arrival order, so the
//! lifecycle behaves like a single-threaded state machine no matter which runtime flavor
//! drives it:
//!
//! - `open`: the attempt counter resets, [`Handler::on_open`] runs and the heartbeat starts.
//! - `message`: [`Handler::on_message`] runs and the heartbeat restarts. Any traffic counts as
//!   liveness, not only replies to the probe.
//! - `error` / `close`: the handler is told first, then a reconnect is scheduled unless one is
//!   already pending, the attempt limit is reached, or the connection was closed.
//! - heartbeat: after `ping_interval` without traffic the probe is sent; after a further
//!   `pong_timeout` without traffic the transport is force-closed, which leads to a reconnect.
//!
//! [`ConnectionManager::close`] is the only way to stop the lifecycle for good.

mod actor;
mod timers;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use self::actor::Actor;
use crate::Result;
use crate::config::Config;
use crate::error::{Error, Kind};
use crate::handler::Handler;
use crate::transport::{Connector, Payload, Transport};
#[cfg(feature = "websocket")]
use crate::transport::websocket::WebSocketConnector;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A transport was created and is establishing its connection
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting to replace a failed transport
    Reconnecting {
        /// Current reconnection attempt number
        attempt: u32,
    },
    /// The transport failed and the reconnect limit was reached
    Disconnected,
    /// Closed by the caller, permanently
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Close,
}

type SharedTransport = Option<Arc<dyn Transport>>;

/// Keeps a logical connection alive over an unreliable transport.
///
/// Cloning yields another handle to the same connection. When every handle is dropped the
/// connection is closed as if [`close`](Self::close) had been called.
///
/// # Example
///
/// ```no_run
/// use resilient_ws::config::Config;
/// use resilient_ws::connection::ConnectionManager;
/// use resilient_ws::handler::Callbacks;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let callbacks = Callbacks::default()
///     .opened(|| println!("connected"))
///     .message_received(|payload| println!("received {payload:?}"));
///
/// let connection = ConnectionManager::connect(Config::new("wss://example.com/feed"), callbacks)?;
/// connection.wait_connected().await;
/// connection.send("hello")?;
/// connection.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    close_requested: Arc<AtomicBool>,
    transport: watch::Receiver<SharedTransport>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionManager {
    /// Create a connection manager and open the first transport.
    ///
    /// Must be called from within a Tokio runtime. If the first transport cannot be created the
    /// error is returned, but the lifecycle is already running and a reconnect is scheduled:
    /// [`StartError::into_manager`] hands the manager back so it can be kept (or closed).
    /// Invalid configuration starts nothing.
    pub fn new<C, H>(config: Config, connector: C, handler: H) -> Result<Self, StartError>
    where
        C: Connector,
        H: Handler,
    {
        config.validate().map_err(StartError::invalid)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let close_requested = Arc::new(AtomicBool::new(false));
        let (transport_tx, transport_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let mut actor = Actor::new(
            config,
            connector,
            handler,
            commands_rx,
            Arc::clone(&close_requested),
            transport_tx,
            state_tx,
        );
        let started = actor.start();

        tokio::spawn(actor.run());

        let manager = Self {
            commands: commands_tx,
            close_requested,
            transport: transport_rx,
            state_rx,
        };

        match started {
            Ok(()) => Ok(manager),
            Err(error) => Err(StartError {
                error,
                manager: Some(manager),
            }),
        }
    }

    /// Create a connection manager over WebSocket.
    #[cfg(feature = "websocket")]
    pub fn connect<H: Handler>(config: Config, handler: H) -> Result<Self, StartError> {
        Self::new(config, WebSocketConnector::default(), handler)
    }

    /// Send `payload` verbatim over the current transport.
    ///
    /// Fails with [`Kind::TransportUnavailable`] when there is no open transport. Nothing is
    /// queued for later delivery.
    pub fn send<P: Into<Payload>>(&self, payload: P) -> Result<()> {
        let transport = self.transport.borrow().as_ref().map(Arc::clone);
        transport
            .ok_or_else(Error::unavailable)?
            .send(payload.into())
    }

    /// Close the connection and never reconnect again.
    ///
    /// Pending heartbeat and reconnect timers are cancelled before the transport is closed.
    /// The transport's resulting close is still reported to [`Handler::on_close`]. Calling this
    /// more than once has no further effect. Notifications still queued when this returns are
    /// treated as arriving after the close: no `on_open` or `on_reconnecting` follows.
    pub fn close(&self) {
        self.close_requested.store(true, Ordering::Release);
        _ = self.commands.send(Command::Close);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Whether [`close`](Self::close) has taken effect.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the connection state changes.
    /// This is useful for detecting reconnections and re-establishing subscriptions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Wait until a transport reports that it is open.
    pub async fn wait_connected(&self) {
        let mut state_rx = self.state_rx.clone();
        _ = state_rx
            .wait_for(|state| state.is_connected() || *state == ConnectionState::Closed)
            .await;
    }

    /// Wait until [`close`](Self::close) has taken effect.
    pub async fn wait_closed(&self) {
        let mut state_rx = self.state_rx.clone();
        _ = state_rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// [`ConnectionManager::new`] could not open its first transport.
///
/// Unless the configuration was invalid, the manager is running anyway and will retry
/// according to its reconnect policy. Dropping this error (or converting it into [`Error`])
/// drops the manager, which shuts the connection down.
#[derive(Debug)]
pub struct StartError {
    error: Error,
    manager: Option<ConnectionManager>,
}

impl StartError {
    fn invalid(error: Error) -> Self {
        Self {
            error,
            manager: None,
        }
    }

    #[must_use]
    pub fn error(&self) -> &Error {
        &self.error
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.error.kind()
    }

    /// The running manager, `None` when the configuration was rejected.
    #[must_use]
    pub fn into_manager(self) -> Option<ConnectionManager> {
        self.manager
    }

    #[must_use]
    pub fn into_parts(self) -> (Error, Option<ConnectionManager>) {
        (self.error, self.manager)
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.manager.is_some() {
            write!(f, "first transport could not be created, reconnecting")
        } else {
            write!(f, "connection manager could not be started")
        }
    }
}

impl StdError for StartError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

impl From<StartError> for Error {
    fn from(err: StartError) -> Self {
        err.error
    }
}
