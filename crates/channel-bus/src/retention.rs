//! # Backlog / Retention Manager
//!
//! Periodically trims channel backlogs per their retention policy (max age
//! and/or max count) and expires idle subscriptions. Eviction never breaks
//! sequence continuity: the per-channel counter survives truncation, and
//! messages a live subscriber has not yet consumed are protected until the
//! policy's grace period has elapsed.
//!
//! Failure to evict is non-fatal: logged and retried on the next cycle.

use crate::config::BusConfig;
use crate::registry::SubscriptionRegistry;
use crate::store::ChannelStore;
use bus_types::{unix_now, ChannelPath, StoreError};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The periodic sweep task.
pub struct BacklogSweeper {
    store: Arc<dyn ChannelStore>,
    registry: Arc<SubscriptionRegistry>,
    config: Arc<BusConfig>,
}

impl BacklogSweeper {
    /// Wire a sweeper over the store and registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn ChannelStore>,
        registry: Arc<SubscriptionRegistry>,
        config: Arc<BusConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run sweep cycles until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Backlog sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One full sweep: expire idle subscriptions, then trim every channel.
    pub fn sweep_once(&self) {
        let expired = self.registry.expire_idle(self.config.idle_timeout);
        if expired > 0 {
            debug!(expired, "Idle subscriptions expired");
        }

        let channels = match self.store.channels() {
            Ok(channels) => channels,
            Err(error) => {
                warn!(%error, "Sweep skipped: channel listing failed");
                return;
            }
        };

        for channel in channels {
            if let Err(error) = self.sweep_channel(&channel) {
                // Retried next cycle; never surfaced
                warn!(channel = %channel, %error, "Backlog sweep failed; retrying next cycle");
            }
        }
    }

    fn sweep_channel(&self, channel: &ChannelPath) -> Result<(), StoreError> {
        let policy = self.config.policy_for(channel);
        let latest = self.store.latest_sequence(channel)?;
        let Some(oldest) = self.store.oldest_sequence(channel)? else {
            return Ok(());
        };

        let mut keep_from = oldest;

        if let Some(max_count) = policy.max_count {
            let count_cutoff = if max_count == 0 {
                latest + 1
            } else {
                latest.saturating_sub(max_count as u64) + 1
            };
            keep_from = keep_from.max(count_cutoff);
        }

        if let Some(max_age) = policy.max_age {
            let now = unix_now();
            let backlog = self.store.read(channel, 0, usize::MAX)?;
            let first_fresh = backlog
                .iter()
                .find(|m| m.age_secs(now) <= max_age.as_secs())
                .map_or(latest + 1, |m| m.sequence);
            keep_from = keep_from.max(first_fresh);
        }

        if keep_from <= oldest {
            return Ok(());
        }

        // Protect messages a live subscriber has not passed, unless they
        // have outlived the grace period.
        if let Some(min_cursor) = self.registry.min_live_cursor(channel) {
            let protected_floor = min_cursor + 1;
            if keep_from > protected_floor {
                let now = unix_now();
                let unconsumed = self
                    .store
                    .read(channel, protected_floor.saturating_sub(1), usize::MAX)?;
                let first_within_grace = unconsumed
                    .iter()
                    .take_while(|m| m.sequence < keep_from)
                    .find(|m| m.age_secs(now) < policy.grace.as_secs())
                    .map(|m| m.sequence);
                if let Some(sequence) = first_within_grace {
                    keep_from = keep_from.min(sequence.max(protected_floor));
                }
            }
        }

        if keep_from <= oldest {
            return Ok(());
        }

        let evicted = self.store.truncate_below(channel, keep_from)?;
        if evicted > 0 {
            debug!(channel = %channel, evicted, keep_from, "Retention evicted backlog");
        }
        Ok(())
    }
}
