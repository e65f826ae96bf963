//! # Bus Types Crate
//!
//! Shared vocabulary for the channel bus: channel paths and patterns,
//! subscriber identity, visibility filters, the message envelope, and the
//! error taxonomy.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every type that crosses the bus boundary is
//!   defined here, once.
//! - **Immutable Envelope**: A [`BusMessage`] is never mutated after it is
//!   assigned a sequence number; consumers share it behind `Arc`.
//! - **Opaque Payloads**: The bus moves `serde_json::Value` blobs. Domain
//!   meaning (what a "post" or a "logout" is) lives with producers and
//!   consumers, not here.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod channel;
pub mod errors;
pub mod message;
pub mod visibility;

pub use channel::{ChannelPath, ChannelPattern};
pub use errors::{ChannelPathError, PatternError, PublishError, StoreError};
pub use message::{unix_now, BusMessage};
pub use visibility::{SubscriberId, SubscriberIdentity, Visibility};
