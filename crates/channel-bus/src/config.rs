//! # Bus Configuration
//!
//! Tunables for polling, subscription expiry, and backlog retention.
//! Defaults suit a single-node deployment; `from_env` applies operator
//! overrides from `BUS_*` environment variables.

use crate::{DEFAULT_MAX_BACKLOG, DEFAULT_MAX_POLL_TIMEOUT_MS, DEFAULT_POLL_BATCH};
use bus_types::ChannelPattern;
use std::time::Duration;
use tracing::warn;

/// Retention bounds for one channel class.
///
/// Either bound may be disabled. `grace` is the slow-subscriber trade-off:
/// messages still below a live subscription's cursor are protected from
/// eviction until they are older than `grace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Evict messages older than this, if set.
    pub max_age: Option<Duration>,
    /// Keep at most this many messages per channel, if set.
    pub max_count: Option<usize>,
    /// How long un-consumed messages stay protected from eviction.
    pub grace: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Some(Duration::from_secs(24 * 60 * 60)),
            max_count: Some(DEFAULT_MAX_BACKLOG),
            grace: Duration::from_secs(60),
        }
    }
}

impl RetentionPolicy {
    /// A policy that never evicts. Useful for control channels whose
    /// backlog must survive slow clients indefinitely.
    #[must_use]
    pub fn keep_forever() -> Self {
        Self {
            max_age: None,
            max_count: None,
            grace: Duration::ZERO,
        }
    }
}

/// Top-level bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Ceiling applied to caller-requested long-poll timeouts.
    pub max_poll_timeout: Duration,

    /// Maximum messages returned for one channel in one poll cycle.
    pub poll_batch: usize,

    /// Subscriptions idle longer than this are expired by the sweeper.
    pub idle_timeout: Duration,

    /// Interval between retention/expiry sweeps.
    pub sweep_interval: Duration,

    /// Default retention policy for channels without an override.
    pub retention: RetentionPolicy,

    /// Per-channel-class retention overrides. First matching pattern wins.
    pub channel_policies: Vec<(ChannelPattern, RetentionPolicy)>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_poll_timeout: Duration::from_millis(DEFAULT_MAX_POLL_TIMEOUT_MS),
            poll_batch: DEFAULT_POLL_BATCH,
            idle_timeout: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(10),
            retention: RetentionPolicy::default(),
            channel_policies: Vec::new(),
        }
    }
}

impl BusConfig {
    /// Build a configuration from defaults plus `BUS_*` environment
    /// overrides. Unparseable values are logged and ignored.
    ///
    /// Recognized variables:
    ///
    /// - `BUS_POLL_TIMEOUT_MS` - long-poll timeout ceiling
    /// - `BUS_IDLE_TIMEOUT_SECS` - subscription idle expiry
    /// - `BUS_SWEEP_INTERVAL_SECS` - retention sweep interval
    /// - `BUS_MAX_BACKLOG` - default per-channel message cap
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("BUS_POLL_TIMEOUT_MS") {
            config.max_poll_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("BUS_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("BUS_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(count) = env_u64("BUS_MAX_BACKLOG") {
            config.retention.max_count = Some(count as usize);
        }

        config
    }

    /// Retention policy in effect for `channel`.
    #[must_use]
    pub fn policy_for(&self, channel: &bus_types::ChannelPath) -> &RetentionPolicy {
        self.channel_policies
            .iter()
            .find(|(pattern, _)| pattern.matches(channel))
            .map_or(&self.retention, |(_, policy)| policy)
    }

    /// Clamp a caller-requested poll timeout to the configured ceiling.
    #[must_use]
    pub fn clamp_poll_timeout(&self, requested: Duration) -> Duration {
        requested.min(self.max_poll_timeout)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable bus config override");
            None
        }
    }
}
