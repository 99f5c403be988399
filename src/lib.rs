#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod transport;

pub use config::{BackoffStrategy, Config, ReconnectConfig};
pub use connection::{ConnectionManager, ConnectionState, StartError};
pub use error::{Error, Kind};
pub use handler::{Callback, Callbacks, Handler};
#[cfg(feature = "websocket")]
pub use transport::websocket::{WebSocketConnector, WebSocketTransport};
pub use transport::{CloseReason, Connector, EventSink, Payload, Transport, TransportEvent};

pub type Result<T, E = Error> = std::result::Result<T, E>;
