//! # Message Bus Facade
//!
//! Wires the channel store, subscription registry, delivery engine and
//! backlog sweeper into one object. Producers see the string-typed
//! publish API; subscribers see subscribe / poll / ack / unsubscribe and
//! the streaming variant.

use crate::config::BusConfig;
use crate::fanout::{DeliveryEngine, PollOutcome};
use crate::publish::{PublishEpoch, PublishOptions, Publisher};
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::retention::BacklogSweeper;
use crate::store::{ChannelStore, InMemoryChannelStore};
use bus_types::{
    ChannelPath, ChannelPattern, PatternError, PublishError, SubscriberIdentity, Visibility,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// The bus. Cheap to share: every component lives behind an `Arc`.
pub struct MessageBus {
    store: Arc<dyn ChannelStore>,
    registry: Arc<SubscriptionRegistry>,
    engine: Arc<DeliveryEngine>,
    epoch: Arc<PublishEpoch>,
    config: Arc<BusConfig>,
    messages_published: AtomicU64,
}

impl MessageBus {
    /// A bus over the in-memory store with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// A bus over the in-memory store with explicit configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self::with_store(Arc::new(InMemoryChannelStore::new()), config)
    }

    /// A bus over a caller-provided store backend.
    #[must_use]
    pub fn with_store(store: Arc<dyn ChannelStore>, config: BusConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SubscriptionRegistry::new());
        let epoch = Arc::new(PublishEpoch::new());
        let engine = Arc::new(DeliveryEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&epoch),
            Arc::clone(&config),
        ));

        Self {
            store,
            registry,
            engine,
            epoch,
            config,
            messages_published: AtomicU64::new(0),
        }
    }

    /// Publish with producer-facing options (`user_ids` / `group_ids`).
    ///
    /// # Errors
    ///
    /// See [`Publisher::publish`].
    pub fn publish_with_options(
        &self,
        channel: &str,
        payload: serde_json::Value,
        options: PublishOptions,
    ) -> Result<u64, PublishError> {
        let channel = ChannelPath::new(channel)?;
        self.commit(&channel, payload, options.visibility())
    }

    /// Register a subscription for `pattern` (exact path or trailing
    /// `/*`), resuming after `since` on every matching channel.
    ///
    /// # Errors
    ///
    /// `PatternError` if the pattern fails validation.
    pub fn subscribe(
        &self,
        identity: SubscriberIdentity,
        pattern: &str,
        since: u64,
    ) -> Result<SubscriptionId, PatternError> {
        let pattern = ChannelPattern::parse(pattern)?;
        Ok(self.registry.subscribe(identity, pattern, since))
    }

    /// Watch an additional pattern on an existing subscription. Returns
    /// false if the handle is unknown.
    ///
    /// # Errors
    ///
    /// `PatternError` if the pattern fails validation.
    pub fn add_pattern(
        &self,
        id: SubscriptionId,
        pattern: &str,
        since: u64,
    ) -> Result<bool, PatternError> {
        let pattern = ChannelPattern::parse(pattern)?;
        Ok(self.registry.add_pattern(id, pattern, since))
    }

    /// Long-poll for the next batch. Timeout yields an empty outcome;
    /// unknown handles are treated as already unsubscribed.
    pub async fn poll(&self, id: SubscriptionId, timeout: Duration) -> PollOutcome {
        self.engine.poll(id, timeout).await
    }

    /// Streaming delivery. Dropping the stream removes the subscription.
    #[must_use]
    pub fn stream(&self, id: SubscriptionId) -> ReceiverStream<crate::fanout::ChannelDelivery> {
        self.engine.stream(id)
    }

    /// Explicitly acknowledge a sequence on a channel. Monotonic; backward
    /// or unknown-handle acknowledgments are silent no-ops.
    pub fn ack(&self, id: SubscriptionId, channel: &ChannelPath, sequence: u64) {
        self.registry.update_cursor(id, channel, sequence);
    }

    /// Remove a subscription. Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.unsubscribe(id);
    }

    /// Claim the per-subscription duplicate-handling latch.
    pub fn claim_handler(&self, id: SubscriptionId) -> bool {
        self.registry.claim_handler(id)
    }

    /// Release the per-subscription duplicate-handling latch.
    pub fn release_handler(&self, id: SubscriptionId) {
        self.registry.release_handler(id)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Spawn the retention/expiry sweeper. It runs until `shutdown` flips
    /// to true (or the sender is dropped).
    #[must_use]
    pub fn start_sweeper(&self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let sweeper = BacklogSweeper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
        );
        tokio::spawn(async move { sweeper.run(shutdown).await })
    }

    fn commit(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
        visibility: Visibility,
    ) -> Result<u64, PublishError> {
        let sequence = self.store.append(channel, payload, visibility)?;
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.epoch.bump();

        debug!(channel = %channel, sequence, "Message published");
        Ok(sequence)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MessageBus {
    fn publish(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
    ) -> Result<u64, PublishError> {
        self.commit(channel, payload, Visibility::Public)
    }

    fn publish_with(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
        visibility: Visibility,
    ) -> Result<u64, PublishError> {
        self.commit(channel, payload, visibility)
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}
