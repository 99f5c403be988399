//! WebSocket transport over `tokio-tungstenite`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use url::Url;

use super::{CloseReason, Connector, EventSink, Payload, Transport};
use crate::Result;
use crate::error::{Error, Kind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the closing handshake once the connection is being torn down.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Outgoing {
    Frame(Message),
    Close,
}

/// Opens [`WebSocketTransport`]s for `ws://` and `wss://` endpoints.
///
/// The handshake runs in a background task; [`Connector::open`] only fails for addresses that
/// can never be connected to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector {
    /// Give up on a handshake that has not completed after this long
    pub connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    #[must_use]
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(connect_timeout),
        }
    }
}

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn open(&mut self, endpoint: &str, events: EventSink) -> Result<Self::Transport> {
        let url = Url::parse(endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::transport_creation(
                endpoint,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tokio::spawn(run(
            url,
            self.connect_timeout,
            outgoing_rx,
            events,
            Arc::clone(&open),
        ));

        Ok(WebSocketTransport {
            outgoing: outgoing_tx,
            open,
        })
    }
}

/// One WebSocket connection. Dropping the handle tears the connection down.
#[derive(Debug)]
pub struct WebSocketTransport {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl WebSocketTransport {
    /// Whether the handshake completed and the connection has not been closed since.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, payload: Payload) -> Result<()> {
        if !self.is_open() {
            return Err(Error::unavailable());
        }

        let frame = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_e| Error::unavailable())
    }

    fn close(&self) {
        _ = self.outgoing.send(Outgoing::Close);
    }
}

async fn connect(url: &Url, connect_timeout: Option<Duration>) -> Result<WsStream> {
    let handshake = connect_async(url.as_str());
    let (stream, _response) = match connect_timeout {
        Some(limit) => timeout(limit, handshake).await.map_err(|_elapsed| {
            Error::with_source(
                Kind::Transport,
                io::Error::new(io::ErrorKind::TimedOut, "WebSocket handshake timed out"),
            )
        })??,
        None => handshake.await?,
    };

    Ok(stream)
}

/// Drive one connection from handshake to teardown, reporting through `events`.
async fn run(
    url: Url,
    connect_timeout: Option<Duration>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSink,
    open: Arc<AtomicBool>,
) {
    let stream = tokio::select! {
        connected = connect(&url, connect_timeout) => match connected {
            Ok(stream) => stream,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%url, error = %e, "Unable to connect");
                events.error(e);
                events.closed(None);
                return;
            }
        },
        // Closed or abandoned before the handshake completed. Nothing else can be queued yet
        // because sends are refused until the connection is open.
        _ = outgoing.recv() => {
            events.closed(None);
            return;
        }
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(%url, "WebSocket connected");

    open.store(true, Ordering::Release);
    events.opened();

    let (mut write, mut read) = stream.split();
    let mut reason = None;

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(%text, "Received WebSocket text message");
                    events.message(Payload::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    events.message(Payload::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    reason = frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.as_str()));
                    break;
                }
                Some(Ok(_)) => {
                    // Control frames are answered by tungstenite and are not application traffic.
                }
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%url, error = %e, "WebSocket read failed");
                    events.error(e.into());
                    break;
                }
                None => break,
            },

            command = outgoing.recv() => match command {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = write.send(frame).await {
                        events.error(e.into());
                        break;
                    }
                }
                Some(Outgoing::Close) | None => break,
            },
        }
    }

    open.store(false, Ordering::Release);
    events.closed(reason);

    // Best effort: the peer may be the reason we are closing.
    _ = timeout(CLOSE_HANDSHAKE_TIMEOUT, write.close()).await;

    #[cfg(feature = "tracing")]
    tracing::debug!(%url, "WebSocket closed");
}
