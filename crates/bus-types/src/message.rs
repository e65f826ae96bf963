//! # Message Envelope
//!
//! The immutable record persisted in a channel's backlog. The payload is an
//! opaque serialized value; the bus never inspects it.

use crate::channel::ChannelPath;
use crate::visibility::Visibility;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A message committed to a channel.
///
/// Immutable once the channel store has assigned its sequence number.
/// Sequence numbers are unique and strictly increasing within a channel,
/// starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    /// The channel this message was published to.
    pub channel: ChannelPath,

    /// Position in the channel's log. Unique within the channel.
    pub sequence: u64,

    /// Opaque serialized payload.
    pub payload: serde_json::Value,

    /// Who may receive this message. Evaluated at delivery time.
    pub visibility: Visibility,

    /// Unix timestamp (seconds) when the message was committed.
    pub published_at: u64,
}

impl BusMessage {
    /// Build a committed message stamped with the current time.
    #[must_use]
    pub fn new(
        channel: ChannelPath,
        sequence: u64,
        payload: serde_json::Value,
        visibility: Visibility,
    ) -> Self {
        Self {
            channel,
            sequence,
            payload,
            visibility,
            published_at: unix_now(),
        }
    }

    /// Age of the message relative to `now` (unix seconds).
    #[must_use]
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.published_at)
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
