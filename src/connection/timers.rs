use std::future::poll_fn;
use std::time::Duration;

use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;

/// A deferred step of the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timeout {
    /// The transport of this generation has been idle for the ping interval
    Ping { generation: u64 },
    /// The probe sent to this generation went unanswered
    Pong { generation: u64 },
    /// Time to build a replacement transport
    Reconnect,
}

/// Pending lifecycle timers, at most one of each kind.
///
/// Arming a timer replaces the pending one of the same kind. Keys are forgotten as soon as
/// their entry expires, so a cancelled key always refers to a live entry.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    queue: DelayQueue<Timeout>,
    ping: Option<Key>,
    pong: Option<Key>,
    reconnect: Option<Key>,
}

impl Timers {
    pub(crate) fn start_ping(&mut self, generation: u64, after: Duration) {
        let key = self.queue.insert(Timeout::Ping { generation }, after);
        Self::replace(&mut self.queue, &mut self.ping, key);
    }

    pub(crate) fn start_pong(&mut self, generation: u64, after: Duration) {
        let key = self.queue.insert(Timeout::Pong { generation }, after);
        Self::replace(&mut self.queue, &mut self.pong, key);
    }

    pub(crate) fn start_reconnect(&mut self, after: Duration) {
        let key = self.queue.insert(Timeout::Reconnect, after);
        Self::replace(&mut self.queue, &mut self.reconnect, key);
    }

    /// Cancel the pending ping and pong timers.
    pub(crate) fn cancel_heartbeat(&mut self) {
        Self::cancel(&mut self.queue, &mut self.ping);
        Self::cancel(&mut self.queue, &mut self.pong);
    }

    pub(crate) fn cancel_reconnect(&mut self) {
        Self::cancel(&mut self.queue, &mut self.reconnect);
    }

    #[cfg(test)]
    pub(crate) fn heartbeat_pending(&self) -> (bool, bool) {
        (self.ping.is_some(), self.pong.is_some())
    }

    #[cfg(test)]
    pub(crate) fn reconnect_pending(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Wait for the next timer to fire. Resolves to `None` immediately when nothing is pending.
    ///
    /// Cancel safe: an entry is only taken from the queue when it is returned.
    pub(crate) async fn expired(&mut self) -> Option<Timeout> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let timeout = expired.into_inner();

        let slot = match timeout {
            Timeout::Ping { .. } => &mut self.ping,
            Timeout::Pong { .. } => &mut self.pong,
            Timeout::Reconnect => &mut self.reconnect,
        };
        *slot = None;

        Some(timeout)
    }

    fn replace(queue: &mut DelayQueue<Timeout>, slot: &mut Option<Key>, key: Key) {
        if let Some(previous) = slot.replace(key) {
            _ = queue.try_remove(&previous);
        }
    }

    fn cancel(queue: &mut DelayQueue<Timeout>, slot: &mut Option<Key>) {
        if let Some(key) = slot.take() {
            _ = queue.try_remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{Instant, advance};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timers_fire_in_deadline_order() {
        let mut timers = Timers::default();
        timers.start_reconnect(Duration::from_millis(30));
        timers.start_ping(1, Duration::from_millis(10));
        timers.start_pong(1, Duration::from_millis(20));

        assert_eq!(timers.expired().await, Some(Timeout::Ping { generation: 1 }));
        assert_eq!(timers.expired().await, Some(Timeout::Pong { generation: 1 }));
        assert_eq!(timers.expired().await, Some(Timeout::Reconnect));
        assert_eq!(timers.expired().await, None);
        assert_eq!(timers.heartbeat_pending(), (false, false));
        assert!(!timers.reconnect_pending(), "fired timers are forgotten");
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_pending_timer() {
        let mut timers = Timers::default();
        let start = Instant::now();

        timers.start_ping(1, Duration::from_millis(10));
        advance(Duration::from_millis(5)).await;
        timers.start_ping(2, Duration::from_millis(10));

        assert_eq!(timers.expired().await, Some(Timeout::Ping { generation: 2 }));
        assert!(
            start.elapsed() >= Duration::from_millis(15),
            "the replaced timer must not fire"
        );
        assert_eq!(timers.expired().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_heartbeat_leaves_reconnect() {
        let mut timers = Timers::default();
        timers.start_ping(1, Duration::from_millis(10));
        timers.start_pong(1, Duration::from_millis(10));
        timers.start_reconnect(Duration::from_millis(50));

        timers.cancel_heartbeat();
        assert_eq!(timers.heartbeat_pending(), (false, false));

        assert_eq!(timers.expired().await, Some(Timeout::Reconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_harmless() {
        let mut timers = Timers::default();
        timers.start_reconnect(Duration::from_millis(1));
        assert_eq!(timers.expired().await, Some(Timeout::Reconnect));

        timers.cancel_reconnect();
        timers.cancel_heartbeat();
        assert_eq!(timers.expired().await, None);
    }
}
