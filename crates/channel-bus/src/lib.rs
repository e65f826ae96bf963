//! # Channel Bus - Ordered Publish/Subscribe Delivery
//!
//! A channel-scoped message bus: producers publish opaque payloads to
//! hierarchical channel paths, the store assigns strictly increasing
//! per-channel sequence numbers, and subscribers drain ordered batches via
//! long-poll or streaming, resuming from their last acknowledged sequence.
//!
//! ```text
//! ┌──────────────┐                          ┌──────────────┐
//! │  Producer A  │  publish(channel,        │ Subscriber 1 │
//! │ (post create)│   payload, filter)       │  (long-poll) │
//! └──────┬───────┘                          └──────▲───────┘
//!        │                                         │ batches since
//!        ▼                                         │ last cursor
//!  ┌───────────┐    seq = n+1    ┌─────────┐       │
//!  │ Publisher │ ───────────────►│ Channel │───────┤
//!  └───────────┘    persist      │  Store  │       │
//!        │                       └────▲────┘       │
//!        │ wake                       │ evict      ▼
//!        ▼                       ┌────┴─────┐ ┌──────────────┐
//!  ┌───────────┐  match + filter │ Backlog  │ │ Subscriber 2 │
//!  │  Fan-out  │ ───────────────►│ Sweeper  │ │  (stream)    │
//!  └───────────┘                 └──────────┘ └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - `append` for one channel is linearizable: concurrent producers never
//!   share a sequence number and committed sequences have no gaps.
//! - Delivery order to any one subscriber equals publish order within a
//!   channel. No cross-channel or cross-subscriber ordering.
//! - Publish returns once persisted; slow consumers never block producers.
//! - A subscriber whose cursor predates the oldest retained message gets a
//!   distinguished gap indicator, never a silently truncated batch.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod config;
pub mod fanout;
pub mod publish;
pub mod registry;
pub mod retention;
pub mod store;

// Re-export main types
pub use bus::MessageBus;
pub use bus_types::{
    BusMessage, ChannelPath, ChannelPattern, PublishError, StoreError, SubscriberId,
    SubscriberIdentity, Visibility,
};
pub use config::{BusConfig, RetentionPolicy};
pub use fanout::{ChannelDelivery, DeliveryEngine, GapNotice, PollOutcome};
pub use publish::{PublishOptions, Publisher};
pub use registry::{SubscriptionId, SubscriptionRegistry, SubscriptionState};
pub use retention::BacklogSweeper;
pub use store::{ChannelStore, InMemoryChannelStore};

/// Maximum messages returned for one channel in one poll cycle.
pub const DEFAULT_POLL_BATCH: usize = 100;

/// Ceiling applied to caller-requested long-poll timeouts.
pub const DEFAULT_MAX_POLL_TIMEOUT_MS: u64 = 30_000;

/// Default per-channel backlog bound before eviction.
pub const DEFAULT_MAX_BACKLOG: usize = 1000;
