#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::{Backoff, Constant};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::Result;
use crate::error::Error;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_PROBE_MESSAGE: &str = "heartbeat";

/// Configuration for a managed connection.
///
/// Deserializes from millisecond-based keys (`ping_interval_ms`, `pong_timeout_ms`,
/// `reconnect.delay_ms`), so it can be read straight from a JSON or YAML settings file.
///
/// ```
/// use std::time::Duration;
///
/// use resilient_ws::config::{Config, ReconnectConfig};
///
/// let config = Config::builder()
///     .endpoint("wss://example.com/feed")
///     .ping_interval(Duration::from_secs(5))
///     .reconnect(ReconnectConfig::builder().max_attempts(3).build())
///     .build();
///
/// assert_eq!(config.probe_message, "heartbeat");
/// assert_eq!(config.reconnect.max_attempts, Some(3));
/// ```
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct Config {
    /// Address to connect to
    #[builder(into)]
    pub endpoint: String,
    /// Idle time after which a liveness probe is sent
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "ping_interval_ms", default = "default_ping_interval")]
    #[builder(default = DEFAULT_PING_INTERVAL)]
    pub ping_interval: Duration,
    /// Time to wait for any inbound traffic after probing before the connection is declared dead
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "pong_timeout_ms", default = "default_pong_timeout")]
    #[builder(default = DEFAULT_PONG_TIMEOUT)]
    pub pong_timeout: Duration,
    /// Payload sent as the liveness probe
    #[serde(default = "default_probe_message")]
    #[builder(into, default = DEFAULT_PROBE_MESSAGE.to_owned())]
    pub probe_message: String,
    /// Reconnection policy
    #[serde(default)]
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Config {
    /// Shorthand for a configuration with every default except the endpoint.
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self::builder().endpoint(endpoint).build()
    }

    /// Reject configurations the connection lifecycle cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::validation("endpoint must not be empty"));
        }
        if self.ping_interval.is_zero() {
            return Err(Error::validation("ping interval must be non-zero"));
        }
        if self.pong_timeout.is_zero() {
            return Err(Error::validation("pong timeout must be non-zero"));
        }

        self.reconnect.validate()
    }
}

/// Configuration for automatic reconnection behavior.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ReconnectConfig {
    /// Delay before a reconnection attempt. Applied to every attempt, including the first.
    /// With [`BackoffStrategy::Exponential`] this is the initial delay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "delay_ms", default = "default_reconnect_delay")]
    #[builder(default = DEFAULT_RECONNECT_DELAY)]
    pub delay: Duration,
    /// Maximum number of consecutive reconnection attempts before giving up.
    /// `None` and `Some(0)` both mean infinite retries.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// How the delay evolves across consecutive attempts
    #[serde(default)]
    #[builder(default)]
    pub backoff: BackoffStrategy,
    /// Invoke [`Handler::on_exhausted`](crate::handler::Handler::on_exhausted) when
    /// `max_attempts` is reached. Giving up is silent otherwise.
    #[serde(default)]
    #[builder(default)]
    pub notify_exhausted: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None, // Infinite reconnection by default
            backoff: BackoffStrategy::Fixed,
            notify_exhausted: false,
        }
    }
}

impl ReconnectConfig {
    fn validate(&self) -> Result<()> {
        if let BackoffStrategy::Exponential {
            max_delay,
            multiplier,
            jitter,
        } = self.backoff
        {
            if multiplier < 1.0 {
                return Err(Error::validation("backoff multiplier must be at least 1.0"));
            }
            if !(0.0..=1.0).contains(&jitter) {
                return Err(Error::validation("backoff jitter must be within 0.0..=1.0"));
            }
            if max_delay < self.delay {
                return Err(Error::validation(
                    "backoff max delay must not be shorter than the reconnect delay",
                ));
            }
        }

        Ok(())
    }

    /// Build the delay policy consulted before every reconnection attempt.
    pub(crate) fn policy(&self) -> Box<dyn Backoff + Send> {
        match self.backoff {
            BackoffStrategy::Fixed => Box::new(Constant::new(self.delay)),
            BackoffStrategy::Exponential {
                max_delay,
                multiplier,
                jitter,
            } => Box::new(
                ExponentialBackoffBuilder::default()
                    .with_initial_interval(self.delay)
                    .with_max_interval(max_delay)
                    .with_multiplier(multiplier)
                    .with_randomization_factor(jitter)
                    .with_max_elapsed_time(None) // We handle max attempts separately
                    .build(),
            ),
        }
    }
}

/// Delay policy between consecutive reconnection attempts.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Wait [`ReconnectConfig::delay`] before every attempt
    #[default]
    Fixed,
    /// Grow the delay geometrically from [`ReconnectConfig::delay`] up to `max_delay`
    Exponential {
        #[serde_as(as = "DurationMilliSeconds<u64>")]
        #[serde(rename = "max_delay_ms")]
        max_delay: Duration,
        multiplier: f64,
        /// Randomization factor applied to each delay, `0.0` disables jitter
        #[serde(default)]
        jitter: f64,
    },
}

fn default_ping_interval() -> Duration {
    DEFAULT_PING_INTERVAL
}

fn default_pong_timeout() -> Duration {
    DEFAULT_PONG_TIMEOUT
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

fn default_probe_message() -> String {
    DEFAULT_PROBE_MESSAGE.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Kind;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::new("ws://localhost:9000");

        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.pong_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
        assert_eq!(config.probe_message, "heartbeat");
        assert_eq!(config.reconnect.max_attempts, None);
        assert_eq!(config.reconnect.backoff, BackoffStrategy::Fixed);
        assert!(!config.reconnect.notify_exhausted, "exhaustion is silent by default");
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "endpoint": "ws://localhost:9000", "ping_interval_ms": 100 }"#)
                .unwrap();

        assert_eq!(config.ping_interval, Duration::from_millis(100));
        assert_eq!(config.pong_timeout, DEFAULT_PONG_TIMEOUT);
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[test]
    fn deserialize_exponential_backoff() {
        let config: Config = serde_json::from_str(
            r#"{
                "endpoint": "ws://localhost:9000",
                "probe_message": "ping",
                "reconnect": {
                    "delay_ms": 10,
                    "max_attempts": 2,
                    "backoff": { "strategy": "exponential", "max_delay_ms": 80, "multiplier": 2.0 }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.probe_message, "ping");
        assert_eq!(config.reconnect.delay, Duration::from_millis(10));
        assert_eq!(config.reconnect.max_attempts, Some(2));
        assert_eq!(
            config.reconnect.backoff,
            BackoffStrategy::Exponential {
                max_delay: Duration::from_millis(80),
                multiplier: 2.0,
                jitter: 0.0,
            }
        );
    }

    #[test]
    fn validate_rejects_empty_endpoint() {
        let err = Config::new("  ").validate().unwrap_err();
        assert_eq!(err.kind(), Kind::Validation);
    }

    #[test]
    fn validate_rejects_zero_ping_interval() {
        let config = Config::builder()
            .endpoint("ws://localhost:9000")
            .ping_interval(Duration::ZERO)
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ping interval"));
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let reconnect = ReconnectConfig::builder()
            .delay(Duration::from_secs(1))
            .backoff(BackoffStrategy::Exponential {
                max_delay: Duration::from_secs(10),
                multiplier: 0.5,
                jitter: 0.0,
            })
            .build();
        let config = Config::builder()
            .endpoint("ws://localhost:9000")
            .reconnect(reconnect)
            .build();

        assert!(config.validate().is_err(), "multiplier below 1.0 must be rejected");
    }

    #[test]
    fn fixed_policy_repeats_delay() {
        let reconnect = ReconnectConfig::builder()
            .delay(Duration::from_millis(10))
            .build();
        let mut policy = reconnect.policy();

        for _ in 0..5 {
            assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        }
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let reconnect = ReconnectConfig::builder()
            .delay(Duration::from_millis(10))
            .backoff(BackoffStrategy::Exponential {
                max_delay: Duration::from_millis(40),
                multiplier: 2.0,
                jitter: 0.0,
            })
            .build();
        let mut policy = reconnect.policy();

        let delays: Vec<_> = (0..5).filter_map(|_| policy.next_backoff()).collect();
        assert_eq!(
            delays,
            [10, 20, 40, 40, 40].map(Duration::from_millis).to_vec()
        );

        policy.reset();
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
    }
}
