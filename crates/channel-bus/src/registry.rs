//! # Subscription Registry
//!
//! Tracks every live subscriber connection: which channel patterns it
//! watches, the last sequence it has acknowledged per channel, and its
//! lifecycle state. The registry owns subscription records exclusively and
//! never touches messages.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──(idle timeout)──► Expired ──► removed
//! Active ──(explicit unsubscribe)─────► removed
//! ```
//!
//! Cursor updates are monotonic: a retried or out-of-order acknowledgment
//! that would move a cursor backward is silently ignored.

use bus_types::{ChannelPath, ChannelPattern, SubscriberIdentity};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Unique subscription handle. Monotonically assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Receiving deliveries.
    Active,
    /// Idle past the timeout; pending removal.
    Expired,
}

/// One watched pattern and the sequence the subscriber had already seen
/// when it registered interest.
#[derive(Debug, Clone)]
struct PatternInterest {
    pattern: ChannelPattern,
    since: u64,
}

/// A registered subscription record.
#[derive(Debug)]
struct SubscriptionEntry {
    identity: SubscriberIdentity,
    patterns: Vec<PatternInterest>,
    /// Last acknowledged sequence per concrete channel.
    cursors: HashMap<ChannelPath, u64>,
    state: SubscriptionState,
    last_active: Instant,
    /// Per-subscriber duplicate-handling latch: set while the consumer is
    /// handling a delivery that must not be handled twice concurrently
    /// (e.g. a logout prompt already on screen).
    handling: bool,
}

impl SubscriptionEntry {
    /// The cursor delivery should resume from for `channel`: the recorded
    /// cursor, or the registration `since` of the first matching pattern.
    fn effective_cursor(&self, channel: &ChannelPath) -> Option<u64> {
        if let Some(cursor) = self.cursors.get(channel) {
            return Some(*cursor);
        }
        self.patterns
            .iter()
            .find(|p| p.pattern.matches(channel))
            .map(|p| p.since)
    }
}

/// Read-only view of a subscription used by the delivery engine. Taken
/// under the entry lock and released before any suspension point.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    /// Who the subscriber is (for visibility evaluation).
    pub identity: SubscriberIdentity,
    /// Watched patterns with their registration cursors.
    pub(crate) patterns: Vec<(ChannelPattern, u64)>,
    /// Recorded per-channel cursors.
    pub(crate) cursors: HashMap<ChannelPath, u64>,
}

impl SubscriptionSnapshot {
    /// The cursor delivery should resume from for `channel`, or `None` if
    /// no pattern matches it.
    #[must_use]
    pub fn cursor_for(&self, channel: &ChannelPath) -> Option<u64> {
        if let Some(cursor) = self.cursors.get(channel) {
            return Some(*cursor);
        }
        self.patterns
            .iter()
            .find(|(pattern, _)| pattern.matches(channel))
            .map(|(_, since)| *since)
    }
}

/// The registry of live subscriptions.
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<SubscriptionId, Arc<Mutex<SubscriptionEntry>>>>,
    /// Per-subscription cancel signals, kept outside the entry lock so an
    /// unsubscribe can wake a blocked poll without contending on it.
    cancels: RwLock<HashMap<SubscriptionId, Arc<Notify>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cancels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscription watching `pattern`, resuming after
    /// sequence `since` on every channel the pattern matches.
    pub fn subscribe(
        &self,
        identity: SubscriberIdentity,
        pattern: ChannelPattern,
        since: u64,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = SubscriptionEntry {
            identity,
            patterns: vec![PatternInterest {
                pattern: pattern.clone(),
                since,
            }],
            cursors: HashMap::new(),
            state: SubscriptionState::Active,
            last_active: Instant::now(),
            handling: false,
        };

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id, Arc::new(Mutex::new(entry)));
        }
        if let Ok(mut cancels) = self.cancels.write() {
            cancels.insert(id, Arc::new(Notify::new()));
        }

        debug!(subscription = %id, pattern = %pattern, since, "Subscription created");
        id
    }

    /// Add another watched pattern to an existing subscription. Returns
    /// false if the handle is unknown.
    pub fn add_pattern(&self, id: SubscriptionId, pattern: ChannelPattern, since: u64) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };
        let Ok(mut entry) = entry.lock() else {
            return false;
        };
        entry.patterns.push(PatternInterest { pattern, since });
        true
    }

    /// Remove a subscription. Idempotent: removing an unknown or
    /// already-removed handle is a no-op. Wakes any blocked long-poll.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self
            .entries
            .write()
            .map(|mut entries| entries.remove(&id).is_some())
            .unwrap_or(false);

        if let Ok(mut cancels) = self.cancels.write() {
            if let Some(notify) = cancels.remove(&id) {
                notify.notify_waiters();
            }
        }

        if removed {
            debug!(subscription = %id, "Subscription removed");
        }
    }

    /// Record a delivery acknowledgment. Monotonic: attempts to move the
    /// cursor backward are silently ignored, as are unknown handles.
    pub fn update_cursor(&self, id: SubscriptionId, channel: &ChannelPath, sequence: u64) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let Ok(mut entry) = entry.lock() else {
            return;
        };

        let current = entry.effective_cursor(channel).unwrap_or(0);
        if sequence < current {
            trace!(
                subscription = %id,
                channel = %channel,
                sequence,
                current,
                "Ignoring backward cursor update"
            );
            return;
        }
        entry.cursors.insert(channel.clone(), sequence);
    }

    /// Refresh a subscription's idle clock.
    pub fn touch(&self, id: SubscriptionId) {
        if let Some(entry) = self.entry(id) {
            if let Ok(mut entry) = entry.lock() {
                entry.last_active = Instant::now();
            }
        }
    }

    /// Snapshot a subscription for a delivery cycle.
    #[must_use]
    pub fn snapshot(&self, id: SubscriptionId) -> Option<SubscriptionSnapshot> {
        let entry = self.entry(id)?;
        let entry = entry.lock().ok()?;
        Some(SubscriptionSnapshot {
            identity: entry.identity.clone(),
            patterns: entry
                .patterns
                .iter()
                .map(|p| (p.pattern.clone(), p.since))
                .collect(),
            cursors: entry.cursors.clone(),
        })
    }

    /// The cancel signal for a subscription, if it still exists.
    #[must_use]
    pub fn cancel_signal(&self, id: SubscriptionId) -> Option<Arc<Notify>> {
        self.cancels.read().ok()?.get(&id).cloned()
    }

    /// Whether the handle refers to a live subscription.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&id))
            .unwrap_or(false)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// True if no subscriptions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim the duplicate-handling latch. Returns true if the caller now
    /// holds it, false if another delivery of the same subscription is
    /// already being handled (or the handle is unknown).
    pub fn claim_handler(&self, id: SubscriptionId) -> bool {
        let Some(entry) = self.entry(id) else {
            return false;
        };
        let Ok(mut entry) = entry.lock() else {
            return false;
        };
        if entry.handling {
            return false;
        }
        entry.handling = true;
        true
    }

    /// Release the duplicate-handling latch. No-op on unknown handles.
    pub fn release_handler(&self, id: SubscriptionId) {
        if let Some(entry) = self.entry(id) {
            if let Ok(mut entry) = entry.lock() {
                entry.handling = false;
            }
        }
    }

    /// Expire and remove subscriptions idle longer than `timeout`. Returns
    /// how many were removed.
    pub fn expire_idle(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();

        if let Ok(entries) = self.entries.read() {
            for (id, entry) in entries.iter() {
                if let Ok(mut entry) = entry.lock() {
                    if now.duration_since(entry.last_active) >= timeout {
                        entry.state = SubscriptionState::Expired;
                        expired.push(*id);
                    }
                }
            }
        }

        for id in &expired {
            debug!(subscription = %id, "Subscription expired (idle)");
            self.unsubscribe(*id);
        }
        expired.len()
    }

    /// The smallest effective cursor over live subscriptions watching
    /// `channel`, or `None` if nobody watches it. Retention uses this to
    /// avoid evicting messages a live subscriber has not passed.
    #[must_use]
    pub fn min_live_cursor(&self, channel: &ChannelPath) -> Option<u64> {
        let entries = self.entries.read().ok()?;
        entries
            .values()
            .filter_map(|entry| {
                let entry = entry.lock().ok()?;
                if entry.state != SubscriptionState::Active {
                    return None;
                }
                entry.effective_cursor(channel)
            })
            .min()
    }

    fn entry(&self, id: SubscriptionId) -> Option<Arc<Mutex<SubscriptionEntry>>> {
        self.entries.read().ok()?.get(&id).cloned()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
