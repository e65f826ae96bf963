//! # Fan-out / Delivery Engine
//!
//! Turns new messages into per-subscriber delivery batches. Two modes:
//!
//! - **Long-poll**: [`DeliveryEngine::poll`] blocks until at least one
//!   eligible message exists past the subscriber's cursor, then returns the
//!   batch; on timeout it returns an empty outcome, not an error.
//! - **Streaming**: [`DeliveryEngine::stream`] forwards every batch into an
//!   open channel as it is produced.
//!
//! Within a channel, delivery order equals publish order. Batches for
//! different channels may interleave but never reorder within one channel.
//! Visibility filters are evaluated here, per subscriber, at delivery time.
//!
//! A poller holds no store or registry lock while suspended, so producers
//! are never blocked by slow consumers.

use crate::config::BusConfig;
use crate::publish::PublishEpoch;
use crate::registry::{SubscriptionId, SubscriptionRegistry, SubscriptionSnapshot};
use crate::store::ChannelStore;
use bus_types::{BusMessage, ChannelPath};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

/// Everything a subscriber missed on one channel: its cursor predates the
/// oldest retained message. The caller must resynchronize from the domain
/// layer; the next poll resumes from the retained backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapNotice {
    /// The cursor the subscriber polled with.
    pub requested_since: u64,
    /// The smallest sequence still retained (one past the gap).
    pub oldest_retained: u64,
}

/// One channel's contribution to a poll cycle.
#[derive(Debug, Clone)]
pub enum ChannelDelivery {
    /// An ordered, contiguous run of visible messages.
    Batch {
        channel: ChannelPath,
        messages: Vec<Arc<BusMessage>>,
    },
    /// Retention evicted messages the subscriber never saw.
    Gap {
        channel: ChannelPath,
        notice: GapNotice,
    },
}

impl ChannelDelivery {
    /// The channel this delivery concerns.
    #[must_use]
    pub fn channel(&self) -> &ChannelPath {
        match self {
            Self::Batch { channel, .. } | Self::Gap { channel, .. } => channel,
        }
    }

    /// True for the gap indicator variant.
    #[must_use]
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// The result of one poll cycle. Empty on timeout.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    /// Per-channel deliveries produced this cycle.
    pub deliveries: Vec<ChannelDelivery>,
}

impl PollOutcome {
    /// True if the poll produced neither messages nor gap notices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// All delivered messages across channels, in delivery order.
    #[must_use]
    pub fn messages(&self) -> Vec<Arc<BusMessage>> {
        self.deliveries
            .iter()
            .filter_map(|d| match d {
                ChannelDelivery::Batch { messages, .. } => Some(messages.iter().cloned()),
                ChannelDelivery::Gap { .. } => None,
            })
            .flatten()
            .collect()
    }
}

/// The delivery engine. Holds no persistent state of its own: every batch
/// is regenerated on demand from the store and the registry snapshot.
pub struct DeliveryEngine {
    store: Arc<dyn ChannelStore>,
    registry: Arc<SubscriptionRegistry>,
    epoch: Arc<PublishEpoch>,
    config: Arc<BusConfig>,
}

impl DeliveryEngine {
    /// Wire an engine over the store, registry and publish epoch.
    #[must_use]
    pub fn new(
        store: Arc<dyn ChannelStore>,
        registry: Arc<SubscriptionRegistry>,
        epoch: Arc<PublishEpoch>,
        config: Arc<BusConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            epoch,
            config,
        }
    }

    /// Long-poll for the next batch.
    ///
    /// Returns immediately with whatever is already pending; otherwise
    /// suspends until a publish epoch bump, an unsubscribe, or the timeout
    /// (clamped to the configured ceiling). Unknown handles and timeouts
    /// both yield an empty outcome.
    pub async fn poll(&self, id: SubscriptionId, requested_timeout: Duration) -> PollOutcome {
        let timeout = self.config.clamp_poll_timeout(requested_timeout);
        let deadline = Instant::now() + timeout;

        // Subscribe to the epoch before the first scan so a publish that
        // lands mid-scan still wakes the select below.
        let mut epoch = self.epoch.watch();

        loop {
            let Some(snapshot) = self.registry.snapshot(id) else {
                // Treated as already unsubscribed
                return PollOutcome::default();
            };
            let cancel = self.registry.cancel_signal(id);

            let (outcome, advanced) = self.collect(id, &snapshot);
            self.registry.touch(id);
            if !outcome.is_empty() {
                return outcome;
            }
            if advanced {
                // The scan consumed only withheld messages. Rescan right
                // away: an eligible message may sit past the invisible run.
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return PollOutcome::default();
            }
            let Some(cancel) = cancel else {
                return PollOutcome::default();
            };

            tokio::select! {
                changed = epoch.changed() => {
                    if changed.is_err() {
                        // Bus dropped while we waited
                        return PollOutcome::default();
                    }
                }
                () = cancel.notified() => {
                    trace!(subscription = %id, "Long-poll released by unsubscribe");
                    return PollOutcome::default();
                }
                () = tokio::time::sleep_until(deadline) => {
                    return PollOutcome::default();
                }
            }
        }
    }

    /// Streaming delivery: a spawned task long-polls in a loop and forwards
    /// each delivery into the returned stream.
    ///
    /// Dropping the stream stops the task and removes the subscription
    /// (connection-loss cleanup). Per-channel order is preserved because a
    /// single task produces every batch.
    #[must_use]
    pub fn stream(self: &Arc<Self>, id: SubscriptionId) -> ReceiverStream<ChannelDelivery> {
        let (tx, rx) = mpsc::channel(16);
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                if !engine.registry.contains(id) {
                    break;
                }
                let outcome = tokio::select! {
                    outcome = engine.poll(id, engine.config.max_poll_timeout) => outcome,
                    () = tx.closed() => {
                        debug!(subscription = %id, "Stream receiver dropped, unsubscribing");
                        engine.registry.unsubscribe(id);
                        return;
                    }
                };
                for delivery in outcome.deliveries {
                    if tx.send(delivery).await.is_err() {
                        debug!(subscription = %id, "Stream receiver dropped, unsubscribing");
                        engine.registry.unsubscribe(id);
                        return;
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// One non-blocking scan over the subscriber's channels. Advances
    /// cursors for everything scanned, including messages withheld by the
    /// visibility filter.
    ///
    /// The second return value is true when some cursor moved: a scan that
    /// consumed only withheld messages must trigger a rescan, not a
    /// suspend, or an eligible message just past the invisible run would
    /// wait out the full poll timeout.
    fn collect(&self, id: SubscriptionId, snapshot: &SubscriptionSnapshot) -> (PollOutcome, bool) {
        let mut outcome = PollOutcome::default();
        let mut advanced = false;

        let channels = match self.store.channels() {
            Ok(channels) => channels,
            Err(error) => {
                warn!(subscription = %id, %error, "Channel scan failed");
                return (outcome, advanced);
            }
        };

        for channel in channels {
            let Some(cursor) = snapshot.cursor_for(&channel) else {
                continue;
            };
            if let Err(error) =
                self.collect_channel(id, snapshot, &channel, cursor, &mut outcome, &mut advanced)
            {
                // Isolated per channel: a store hiccup on one channel must
                // not sink the whole poll.
                warn!(subscription = %id, channel = %channel, %error, "Channel read failed");
            }
        }

        (outcome, advanced)
    }

    fn collect_channel(
        &self,
        id: SubscriptionId,
        snapshot: &SubscriptionSnapshot,
        channel: &ChannelPath,
        cursor: u64,
        outcome: &mut PollOutcome,
        advanced: &mut bool,
    ) -> Result<(), bus_types::StoreError> {
        let latest = self.store.latest_sequence(channel)?;
        if latest <= cursor {
            return Ok(());
        }

        match self.store.oldest_sequence(channel)? {
            Some(oldest) if cursor + 1 >= oldest => {
                let messages = self.store.read(channel, cursor, self.config.poll_batch)?;
                let Some(last) = messages.last().map(|m| m.sequence) else {
                    return Ok(());
                };

                let visible: Vec<Arc<BusMessage>> = messages
                    .into_iter()
                    .filter(|m| m.visibility.allows(&snapshot.identity))
                    .collect();

                // Withheld messages advance the cursor too: visibility is
                // decided at delivery time and history is never retracted.
                self.registry.update_cursor(id, channel, last);
                *advanced = true;

                if !visible.is_empty() {
                    outcome.deliveries.push(ChannelDelivery::Batch {
                        channel: channel.clone(),
                        messages: visible,
                    });
                }
            }
            Some(oldest) => {
                // The cursor predates the retained backlog.
                debug!(
                    subscription = %id,
                    channel = %channel,
                    cursor,
                    oldest,
                    "Retention gap reported"
                );
                outcome.deliveries.push(ChannelDelivery::Gap {
                    channel: channel.clone(),
                    notice: GapNotice {
                        requested_since: cursor,
                        oldest_retained: oldest,
                    },
                });
                self.registry.update_cursor(id, channel, oldest - 1);
                *advanced = true;
            }
            None => {
                // Backlog fully evicted but the counter is past the cursor.
                outcome.deliveries.push(ChannelDelivery::Gap {
                    channel: channel.clone(),
                    notice: GapNotice {
                        requested_since: cursor,
                        oldest_retained: latest + 1,
                    },
                });
                self.registry.update_cursor(id, channel, latest);
                *advanced = true;
            }
        }

        Ok(())
    }
}
