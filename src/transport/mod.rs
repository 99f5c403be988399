#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types include the module name to indicate their scope"
)]

//! The transport capability the connection lifecycle is built on.
//!
//! A [`Connector`] instantiates [`Transport`]s. Instantiation is synchronous and may fail; the
//! connection itself is established in the background and reported through the [`EventSink`]
//! handed to [`Connector::open`]. A transport reports, in order:
//!
//! - [`EventSink::opened`] once the connection is usable,
//! - [`EventSink::message`] for every inbound payload,
//! - [`EventSink::error`] for runtime failures,
//! - [`EventSink::closed`] exactly once, when the connection is gone for good.
//!
//! [`websocket`] provides the implementation over `tokio-tungstenite`.

#[cfg(feature = "websocket")]
pub mod websocket;

use std::fmt;

use tokio::sync::mpsc;

use crate::Result;
use crate::error::Error;

/// A message carried by the transport, delivered and sent verbatim.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes.as_slice(),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// Why the peer closed the connection, when it said so.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Notification emitted by a transport.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(Payload),
    Error(Error),
    Close(Option<CloseReason>),
}

/// Notification tagged with the transport instance that produced it.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) generation: u64,
    pub(crate) event: TransportEvent,
}

/// Notification binding handed to a transport when it is created.
///
/// Every event is stamped with the transport instance it belongs to, so events from a replaced
/// transport can never be mistaken for events of the current one. Sending never blocks; events
/// emitted after the connection manager has shut down are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Open);
    }

    pub fn message<P: Into<Payload>>(&self, payload: P) {
        self.emit(TransportEvent::Message(payload.into()));
    }

    pub fn error(&self, error: Error) {
        self.emit(TransportEvent::Error(error));
    }

    pub fn closed(&self, reason: Option<CloseReason>) {
        self.emit(TransportEvent::Close(reason));
    }

    /// Whether the receiving side is gone, i.e. nobody listens to this transport anymore.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, event: TransportEvent) {
        _ = self.tx.send(Envelope {
            generation: self.generation,
            event,
        });
    }
}

/// Instantiates transports bound to an endpoint.
pub trait Connector: Send + 'static {
    type Transport: Transport;

    /// Create a transport for `endpoint` reporting to `events`.
    ///
    /// This must not wait for the connection to be established: failures that can be detected
    /// up front (malformed address, unsupported scheme) are returned as
    /// [`Kind::TransportCreation`](crate::error::Kind::TransportCreation), everything else is
    /// reported later through `events`.
    fn open(&mut self, endpoint: &str, events: EventSink) -> Result<Self::Transport>;
}

/// Handle to one underlying connection.
pub trait Transport: Send + Sync + 'static {
    /// Send `payload` as-is.
    ///
    /// Fails with [`Kind::TransportUnavailable`](crate::error::Kind::TransportUnavailable) if
    /// the connection is not open. Nothing is buffered.
    fn send(&self, payload: Payload) -> Result<()>;

    /// Start closing the connection. Must eventually emit [`EventSink::closed`] if it has not
    /// been emitted yet, and must be harmless to call more than once.
    fn close(&self);
}
