use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use backoff::backoff::Backoff;
use tokio::sync::{mpsc, watch};

use super::timers::{Timeout, Timers};
use super::{Command, ConnectionState, SharedTransport};
use crate::Result;
use crate::config::Config;
use crate::handler::Handler;
use crate::transport::{
    CloseReason, Connector, Envelope, EventSink, Payload, Transport, TransportEvent,
};

/// Owns every piece of mutable connection state.
///
/// Runs as one task; transport notifications, timers and commands are handled strictly one
/// after another, so none of the fields below need synchronization.
pub(super) struct Actor<C: Connector, H: Handler> {
    config: Config,
    connector: C,
    handler: H,
    policy: Box<dyn Backoff + Send>,
    timers: Timers,

    /// The only live transport. Replaced wholesale on reconnect.
    transport: Option<Arc<dyn Transport>>,
    /// Whether `transport` has yet to report its close.
    transport_alive: bool,
    /// Bumped for every transport created. Notifications and heartbeat timers carry the
    /// generation they belong to and are ignored once it is outdated.
    generation: u64,

    /// Consecutive reconnect attempts since the last successful open.
    attempt_count: u32,
    /// Logical mutual exclusion between reconnect schedules, not a synchronization primitive.
    /// Set when a reconnect is scheduled, cleared once the replacement transport exists.
    reconnect_in_flight: bool,
    /// One-way latch set by `close`.
    permanently_closed: bool,
    /// Set by [`ConnectionManager::close`](super::ConnectionManager::close) before the command
    /// is queued. Events already waiting in the queues must not outrun it.
    close_requested: Arc<AtomicBool>,
    /// Whether giving up was already reported for the current failure streak.
    exhausted: bool,

    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    commands: mpsc::UnboundedReceiver<Command>,
    shared: watch::Sender<SharedTransport>,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector, H: Handler> Actor<C, H> {
    pub(super) fn new(
        config: Config,
        connector: C,
        handler: H,
        commands: mpsc::UnboundedReceiver<Command>,
        close_requested: Arc<AtomicBool>,
        shared: watch::Sender<SharedTransport>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let policy = config.reconnect.policy();

        Self {
            config,
            connector,
            handler,
            policy,
            timers: Timers::default(),
            transport: None,
            transport_alive: false,
            generation: 0,
            attempt_count: 0,
            reconnect_in_flight: false,
            permanently_closed: false,
            close_requested,
            exhausted: false,
            events_tx,
            events_rx,
            commands,
            shared,
            state,
        }
    }

    /// Open the first transport. On failure a reconnect is scheduled and the error is also
    /// returned to the caller.
    pub(super) fn start(&mut self) -> Result<()> {
        let opened = self.open_transport();
        if opened.is_err() {
            self.schedule_reconnect();
        }
        opened
    }

    /// Process events until the connection is closed and its transport is gone, or until every
    /// handle has been dropped.
    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Close) => self.close(),
                    None => {
                        self.close();
                        break;
                    }
                },

                Some(envelope) = self.events_rx.recv() => {
                    self.honor_close_request();
                    self.on_event(envelope);
                }

                Some(timeout) = self.timers.expired() => {
                    self.honor_close_request();
                    self.on_timeout(timeout);
                }
            }

            if self.permanently_closed && self.transport.is_none() {
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.config.endpoint, "Connection task exiting");
    }

    /// Apply a `close` the caller already returned from but whose command is not processed yet.
    fn honor_close_request(&mut self) {
        if self.close_requested.load(Ordering::Acquire) {
            self.close();
        }
    }

    fn open_transport(&mut self) -> Result<()> {
        if let Some(previous) = self.transport.take() {
            // Whatever the abandoned transport reports from now on is stale.
            previous.close();
        }
        self.transport_alive = false;
        self.shared.send_replace(None);

        self.generation = self.generation.wrapping_add(1);
        let events = EventSink::new(self.generation, self.events_tx.clone());

        match self.connector.open(&self.config.endpoint, events) {
            Ok(transport) => {
                let transport: Arc<dyn Transport> = Arc::new(transport);
                self.transport = Some(Arc::clone(&transport));
                self.transport_alive = true;
                self.shared.send_replace(Some(transport));
                self.publish(ConnectionState::Connecting);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    endpoint = %self.config.endpoint,
                    generation = self.generation,
                    "Transport created"
                );
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(endpoint = %self.config.endpoint, error = %e, "Unable to create transport");
                Err(e)
            }
        }
    }

    fn on_event(&mut self, envelope: Envelope) {
        if envelope.generation != self.generation {
            #[cfg(feature = "tracing")]
            tracing::trace!(
                generation = envelope.generation,
                current = self.generation,
                event = ?envelope.event,
                "Ignoring event from a replaced transport"
            );
            return;
        }

        match envelope.event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(payload) => {
                self.handler.on_message(payload);
                self.restart_heartbeat();
            }
            TransportEvent::Error(error) => {
                self.timers.cancel_heartbeat();
                self.handler.on_error(&error);
                self.schedule_reconnect();
            }
            TransportEvent::Close(reason) => self.on_close(reason),
        }
    }

    fn on_open(&mut self) {
        if self.permanently_closed {
            return;
        }

        self.attempt_count = 0;
        self.exhausted = false;
        self.policy.reset();
        self.publish(ConnectionState::Connected {
            since: Instant::now(),
        });

        self.handler.on_open();
        self.restart_heartbeat();
    }

    fn on_close(&mut self, reason: Option<CloseReason>) {
        self.timers.cancel_heartbeat();
        self.transport_alive = false;
        if self.permanently_closed {
            self.transport = None;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(generation = self.generation, ?reason, "Transport closed");

        self.handler.on_close(reason.as_ref());
        self.schedule_reconnect();
    }

    fn on_timeout(&mut self, timeout: Timeout) {
        match timeout {
            Timeout::Ping { generation } => self.probe(generation),
            Timeout::Pong { generation } => self.declare_dead(generation),
            Timeout::Reconnect => self.reconnect(),
        }
    }

    /// Cancel any pending heartbeat timers and start a new cycle.
    fn restart_heartbeat(&mut self) {
        self.timers.cancel_heartbeat();
        if self.permanently_closed {
            return;
        }

        self.timers
            .start_ping(self.generation, self.config.ping_interval);
    }

    fn probe(&mut self, generation: u64) {
        if generation != self.generation || self.permanently_closed {
            return;
        }
        let Some(transport) = &self.transport else {
            return;
        };

        let probe = Payload::Text(self.config.probe_message.clone());
        if let Err(e) = transport.send(probe) {
            // The pong timer still runs: a transport that cannot carry the probe is not alive.
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Unable to send liveness probe");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }

        self.timers
            .start_pong(generation, self.config.pong_timeout);
    }

    fn declare_dead(&mut self, generation: u64) {
        if generation != self.generation || self.permanently_closed {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Heartbeat timeout: no traffic received within {:?} of probing",
            self.config.pong_timeout
        );

        if let Some(transport) = &self.transport {
            transport.close();
        }
    }

    fn schedule_reconnect(&mut self) {
        if let Some(max) = self.config.reconnect.max_attempts
            && max > 0
            && self.attempt_count >= max
        {
            self.give_up();
            return;
        }
        if self.reconnect_in_flight || self.permanently_closed {
            return;
        }

        self.reconnect_in_flight = true;
        self.attempt_count = self.attempt_count.saturating_add(1);
        let attempt = self.attempt_count;
        let delay = self
            .policy
            .next_backoff()
            .unwrap_or(self.config.reconnect.delay);

        self.publish(ConnectionState::Reconnecting { attempt });

        #[cfg(feature = "tracing")]
        tracing::info!(attempt, ?delay, endpoint = %self.config.endpoint, "Scheduling reconnect");

        self.handler.on_reconnecting(attempt);
        self.timers.start_reconnect(delay);
    }

    fn reconnect(&mut self) {
        if self.permanently_closed {
            return;
        }

        let opened = self.open_transport();
        self.reconnect_in_flight = false;

        if let Err(error) = opened {
            self.handler.on_error(&error);
            self.schedule_reconnect();
        }
    }

    /// The attempt limit was hit. Silent unless `notify_exhausted` is configured.
    fn give_up(&mut self) {
        // A reconnect that is still pending may yet succeed.
        if self.exhausted || self.permanently_closed || self.reconnect_in_flight {
            return;
        }
        self.exhausted = true;
        self.publish(ConnectionState::Disconnected);

        #[cfg(feature = "tracing")]
        tracing::warn!(
            attempts = self.attempt_count,
            endpoint = %self.config.endpoint,
            "Reconnect attempts exhausted, giving up"
        );

        if self.config.reconnect.notify_exhausted {
            self.handler.on_exhausted(self.attempt_count);
        }
    }

    fn close(&mut self) {
        if self.permanently_closed {
            return;
        }
        self.permanently_closed = true;

        self.timers.cancel_heartbeat();
        self.timers.cancel_reconnect();
        self.publish(ConnectionState::Closed);
        self.shared.send_replace(None);

        if let Some(transport) = &self.transport {
            transport.close();
        }
        if !self.transport_alive {
            self.transport = None;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.config.endpoint, "Connection closed by caller");
    }

    fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}
