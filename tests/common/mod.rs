#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use resilient_ws::config::{Config, ReconnectConfig};
use resilient_ws::error::{Error, Kind};
use resilient_ws::handler::Handler;
use resilient_ws::transport::{CloseReason, Connector, EventSink, Payload, Transport};

pub const ENDPOINT: &str = "mock://lifecycle";

/// Let the connection task drain everything that is ready without moving the paused clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Configuration from the documented scenario: 100ms ping, 50ms pong, 10ms reconnect delay.
pub fn scenario_config(max_attempts: Option<u32>) -> Config {
    Config::builder()
        .endpoint(ENDPOINT)
        .ping_interval(Duration::from_millis(100))
        .pong_timeout(Duration::from_millis(50))
        .reconnect(
            ReconnectConfig::builder()
                .delay(Duration::from_millis(10))
                .maybe_max_attempts(max_attempts)
                .build(),
        )
        .build()
}

/// Everything observable about one transport the mock connector created.
#[derive(Debug, Default)]
struct MockState {
    open: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    sent: Mutex<Vec<Payload>>,
}

/// Test-side handle to a transport, used to script its notifications.
#[derive(Debug, Clone)]
pub struct MockHandle {
    events: EventSink,
    state: Arc<MockState>,
}

impl MockHandle {
    /// The connection was established.
    pub fn open(&self) {
        self.state.open.store(true, Ordering::SeqCst);
        self.events.opened();
    }

    /// Inbound traffic.
    pub fn message(&self, text: &str) {
        self.events.message(text);
    }

    /// The connection broke: an error followed by a close, like a browser socket reports it.
    pub fn fail(&self) {
        self.events.error(Error::with_source(
            Kind::Transport,
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
        ));
        self.drop_connection(None);
    }

    /// The peer closed the connection.
    pub fn drop_connection(&self, reason: Option<CloseReason>) {
        self.state.open.store(false, Ordering::SeqCst);
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            self.events.closed(reason);
        }
    }

    pub fn sent(&self) -> Vec<Payload> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockTransport {
    handle: MockHandle,
}

impl Transport for MockTransport {
    fn send(&self, payload: Payload) -> resilient_ws::Result<()> {
        if !self.handle.state.open.load(Ordering::SeqCst) {
            return Err(Error::unavailable());
        }
        self.handle.state.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn close(&self) {
        self.handle.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.handle.drop_connection(None);
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    transports: Mutex<Vec<MockHandle>>,
    /// Number of upcoming `open` calls that fail synchronously.
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

/// Connector whose transports are driven by the test.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
}

impl MockConnector {
    /// Make the next `count` calls to `open` fail synchronously.
    pub fn fail_next(&self, count: usize) {
        self.state.failures.store(count, Ordering::SeqCst);
    }

    /// Calls to `open`, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Transports created so far.
    pub fn created(&self) -> usize {
        self.state.transports.lock().unwrap().len()
    }

    pub fn transport(&self, index: usize) -> MockHandle {
        self.state.transports.lock().unwrap()[index].clone()
    }

    pub fn latest(&self) -> MockHandle {
        self.state.transports.lock().unwrap().last().unwrap().clone()
    }

    /// Transports that have not reported their close yet.
    pub fn live(&self) -> usize {
        self.state
            .transports
            .lock()
            .unwrap()
            .iter()
            .filter(|t| !t.is_closed())
            .count()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(&mut self, endpoint: &str, events: EventSink) -> resilient_ws::Result<MockTransport> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::transport_creation(endpoint, "refused by test"));
        }

        let handle = MockHandle {
            events,
            state: Arc::new(MockState::default()),
        };
        self.state.transports.lock().unwrap().push(handle.clone());

        Ok(MockTransport { handle })
    }
}

/// One observed handler notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Open,
    Close(Option<u16>),
    Error(Kind),
    Message(String),
    Reconnecting(u32),
    Exhausted(u32),
}

/// Handler that records every notification in order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn events(&self) -> MutexGuard<'_, Vec<Recorded>> {
        self.seen.lock().unwrap()
    }

    pub fn count(&self, wanted: &Recorded) -> usize {
        self.events().iter().filter(|r| *r == wanted).count()
    }

    pub fn reconnects(&self) -> Vec<u32> {
        self.events()
            .iter()
            .filter_map(|r| match r {
                Recorded::Reconnecting(attempt) => Some(*attempt),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events().clear();
    }

    fn push(&self, recorded: Recorded) {
        self.seen.lock().unwrap().push(recorded);
    }
}

impl Handler for Recorder {
    fn on_open(&mut self) {
        self.push(Recorded::Open);
    }

    fn on_close(&mut self, reason: Option<&CloseReason>) {
        self.push(Recorded::Close(reason.map(|r| r.code)));
    }

    fn on_error(&mut self, error: &Error) {
        self.push(Recorded::Error(error.kind()));
    }

    fn on_message(&mut self, payload: Payload) {
        self.push(Recorded::Message(
            payload.as_text().unwrap_or_default().to_owned(),
        ));
    }

    fn on_reconnecting(&mut self, attempt: u32) {
        self.push(Recorded::Reconnecting(attempt));
    }

    fn on_exhausted(&mut self, attempts: u32) {
        self.push(Recorded::Exhausted(attempts));
    }
}
