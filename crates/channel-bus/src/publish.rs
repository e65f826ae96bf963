//! # Publisher
//!
//! The producer side of the bus. Publishing persists the message through
//! the channel store, bumps the publish epoch to wake blocked pollers, and
//! returns the assigned sequence number. Delivery is decoupled: no
//! subscriber work happens on the publish path, so slow consumers never
//! block producers.
//!
//! The bus does not deduplicate. Idempotence is the producer's
//! responsibility; consumer-side duplicate suppression is the registry's
//! handler latch.

use bus_types::{ChannelPath, PublishError, Visibility};
use std::collections::BTreeSet;
use tokio::sync::watch;

/// Producer-facing publish options: the visibility filter as the caller
/// sees it (`user_ids` / `group_ids` sets).
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Restrict delivery to these authenticated users.
    pub user_ids: Option<BTreeSet<u64>>,
    /// Restrict delivery to members of these groups.
    pub group_ids: Option<BTreeSet<u64>>,
}

impl PublishOptions {
    /// Resolve the options into a visibility filter.
    #[must_use]
    pub fn visibility(self) -> Visibility {
        Visibility::from_options(self.user_ids, self.group_ids)
    }
}

/// Trait for publishing messages to the bus.
///
/// This is the interface domain workflows (post creation, logout
/// broadcast, ...) use to emit change notifications.
pub trait Publisher: Send + Sync {
    /// Publish a public message. Returns the assigned sequence number once
    /// the message is persisted.
    ///
    /// # Errors
    ///
    /// `PublishError::Store` if the backing store is unreachable; the
    /// producer must retry and must not assume delivery.
    fn publish(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
    ) -> Result<u64, PublishError>;

    /// Publish with an explicit visibility filter.
    fn publish_with(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
        visibility: Visibility,
    ) -> Result<u64, PublishError>;

    /// Total messages published through this bus.
    fn messages_published(&self) -> u64;
}

/// Monotonic publish epoch. Blocked pollers watch it; every successful
/// publish bumps it, waking them to re-scan their channels.
#[derive(Debug)]
pub struct PublishEpoch {
    sender: watch::Sender<u64>,
}

impl PublishEpoch {
    /// Create a fresh epoch at zero.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self { sender }
    }

    /// Advance the epoch, waking every watcher.
    pub fn bump(&self) {
        self.sender.send_modify(|epoch| *epoch += 1);
    }

    /// A watcher that has seen the current epoch; `changed()` resolves on
    /// the next bump.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.sender.subscribe()
    }
}

impl Default for PublishEpoch {
    fn default() -> Self {
        Self::new()
    }
}
