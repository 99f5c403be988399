//! Lifecycle notifications delivered to the owner of a connection.

use std::fmt;

use crate::error::Error;
use crate::transport::{CloseReason, Payload};

/// Receives connection lifecycle notifications.
///
/// Every method defaults to a no-op, so implementors only override what they care about.
/// Notifications are delivered one at a time from the task that drives the connection and are
/// always delivered before the connection acts on the event (for example, `on_close` runs
/// before a reconnect is scheduled). Handlers must not block.
///
/// `()` is the handler that ignores everything.
pub trait Handler: Send + 'static {
    /// The transport finished connecting.
    fn on_open(&mut self) {}

    /// The transport closed, for any reason.
    fn on_close(&mut self, reason: Option<&CloseReason>) {
        _ = reason;
    }

    /// The transport failed, or a replacement transport could not be created.
    fn on_error(&mut self, error: &Error) {
        _ = error;
    }

    /// Inbound traffic, including replies to liveness probes.
    fn on_message(&mut self, payload: Payload) {
        _ = payload;
    }

    /// A reconnect was scheduled. `attempt` counts from 1 since the last successful open.
    fn on_reconnecting(&mut self, attempt: u32) {
        _ = attempt;
    }

    /// The reconnect limit was reached. Only delivered when
    /// [`ReconnectConfig::notify_exhausted`](crate::config::ReconnectConfig::notify_exhausted)
    /// is set.
    fn on_exhausted(&mut self, attempts: u32) {
        _ = attempts;
    }
}

impl Handler for () {}

type Notify = Box<dyn FnMut() + Send>;
type NotifyClose = Box<dyn FnMut(Option<&CloseReason>) + Send>;
type NotifyError = Box<dyn FnMut(&Error) + Send>;
type NotifyMessage = Box<dyn FnMut(Payload) + Send>;
type NotifyAttempt = Box<dyn FnMut(u32) + Send>;

/// Names the notifications a [`Callbacks`] can hold a closure for.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    Opened,
    Closed,
    Errored,
    MessageReceived,
    Reconnecting,
    Exhausted,
}

/// Closure-based [`Handler`].
///
/// ```
/// use resilient_ws::handler::{Callback, Callbacks};
///
/// let callbacks = Callbacks::default()
///     .opened(|| println!("connected"))
///     .message_received(|payload| println!("{payload:?}"))
///     .reconnecting(|attempt| println!("reconnect attempt {attempt}"));
///
/// assert!(callbacks.is_registered(Callback::Opened));
/// assert!(!callbacks.is_registered(Callback::Closed));
/// ```
#[derive(Default)]
pub struct Callbacks {
    opened: Option<Notify>,
    closed: Option<NotifyClose>,
    errored: Option<NotifyError>,
    message_received: Option<NotifyMessage>,
    reconnecting: Option<NotifyAttempt>,
    exhausted: Option<NotifyAttempt>,
}

impl Callbacks {
    #[must_use]
    pub fn opened<F: FnMut() + Send + 'static>(mut self, f: F) -> Self {
        self.opened = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn closed<F: FnMut(Option<&CloseReason>) + Send + 'static>(mut self, f: F) -> Self {
        self.closed = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn errored<F: FnMut(&Error) + Send + 'static>(mut self, f: F) -> Self {
        self.errored = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn message_received<F: FnMut(Payload) + Send + 'static>(mut self, f: F) -> Self {
        self.message_received = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn reconnecting<F: FnMut(u32) + Send + 'static>(mut self, f: F) -> Self {
        self.reconnecting = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn exhausted<F: FnMut(u32) + Send + 'static>(mut self, f: F) -> Self {
        self.exhausted = Some(Box::new(f));
        self
    }

    /// Whether a closure was registered for `callback`.
    #[must_use]
    pub fn is_registered(&self, callback: Callback) -> bool {
        match callback {
            Callback::Opened => self.opened.is_some(),
            Callback::Closed => self.closed.is_some(),
            Callback::Errored => self.errored.is_some(),
            Callback::MessageReceived => self.message_received.is_some(),
            Callback::Reconnecting => self.reconnecting.is_some(),
            Callback::Exhausted => self.exhausted.is_some(),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("opened", &self.opened.is_some())
            .field("closed", &self.closed.is_some())
            .field("errored", &self.errored.is_some())
            .field("message_received", &self.message_received.is_some())
            .field("reconnecting", &self.reconnecting.is_some())
            .field("exhausted", &self.exhausted.is_some())
            .finish()
    }
}

impl Handler for Callbacks {
    fn on_open(&mut self) {
        if let Some(f) = self.opened.as_mut() {
            f();
        }
    }

    fn on_close(&mut self, reason: Option<&CloseReason>) {
        if let Some(f) = self.closed.as_mut() {
            f(reason);
        }
    }

    fn on_error(&mut self, error: &Error) {
        if let Some(f) = self.errored.as_mut() {
            f(error);
        }
    }

    fn on_message(&mut self, payload: Payload) {
        if let Some(f) = self.message_received.as_mut() {
            f(payload);
        }
    }

    fn on_reconnecting(&mut self, attempt: u32) {
        if let Some(f) = self.reconnecting.as_mut() {
            f(attempt);
        }
    }

    fn on_exhausted(&mut self, attempts: u32) {
        if let Some(f) = self.exhausted.as_mut() {
            f(attempts);
        }
    }
}
