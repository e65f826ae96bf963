//! # Channel Store
//!
//! The durable, ordered append log: one sequence-numbered backlog per
//! channel path. Sequence assignment for a channel is serialized by that
//! channel's shard lock; channels never contend with each other, and reads
//! copy `Arc`s out without blocking writers on other channels.

use bus_types::{BusMessage, ChannelPath, StoreError, Visibility};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

/// Storage seam for the bus.
///
/// The bus ships with [`InMemoryChannelStore`]; multi-process deployments
/// would back this trait with a shared store (e.g. Redis, Postgres) instead.
pub trait ChannelStore: Send + Sync {
    /// Assign the next sequence number for `channel` (starting at 1),
    /// persist the message, and return the assigned number.
    ///
    /// Concurrent appends to the same channel must be linearizable: no two
    /// producers are ever assigned the same sequence number.
    ///
    /// # Errors
    ///
    /// `StoreError::Unavailable` if the backing store is unreachable.
    fn append(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
        visibility: Visibility,
    ) -> Result<u64, StoreError>;

    /// All messages with sequence number > `since`, ascending, capped at
    /// `max`. Empty if none. Never blocks; callable repeatedly with
    /// increasing `since`.
    fn read(
        &self,
        channel: &ChannelPath,
        since: u64,
        max: usize,
    ) -> Result<Vec<Arc<BusMessage>>, StoreError>;

    /// Current high-water mark for `channel`; 0 if never written. Survives
    /// backlog eviction: truncation never resets the counter.
    fn latest_sequence(&self, channel: &ChannelPath) -> Result<u64, StoreError>;

    /// Smallest sequence number still retained, or `None` if the backlog is
    /// empty. Used by delivery to detect retention gaps.
    fn oldest_sequence(&self, channel: &ChannelPath) -> Result<Option<u64>, StoreError>;

    /// Every channel the store has seen a write for.
    fn channels(&self) -> Result<Vec<ChannelPath>, StoreError>;

    /// Evict all messages with sequence number < `keep_from`; returns the
    /// number evicted. The sequence counter is untouched.
    fn truncate_below(&self, channel: &ChannelPath, keep_from: u64) -> Result<usize, StoreError>;
}

/// One channel's backlog plus its sequence counter.
#[derive(Debug)]
struct ChannelLog {
    /// Next sequence number to assign. Starts at 1, never reset.
    next_sequence: u64,
    /// Retained messages, ascending by sequence.
    entries: VecDeque<Arc<BusMessage>>,
}

impl ChannelLog {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            entries: VecDeque::new(),
        }
    }
}

/// In-memory implementation of the channel store.
///
/// Suitable for single-node operation; cross-process deployments would use
/// a different `ChannelStore` implementation over shared storage.
pub struct InMemoryChannelStore {
    /// Per-channel shards. The outer lock only guards the map shape;
    /// appends hold the per-channel mutex, not this lock.
    shards: RwLock<HashMap<ChannelPath, Arc<Mutex<ChannelLog>>>>,
}

impl InMemoryChannelStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
        }
    }

    fn shard(&self, channel: &ChannelPath) -> Result<Option<Arc<Mutex<ChannelLog>>>, StoreError> {
        Ok(self
            .shards
            .read()
            .map_err(|_| poisoned())?
            .get(channel)
            .cloned())
    }

    fn shard_or_create(&self, channel: &ChannelPath) -> Result<Arc<Mutex<ChannelLog>>, StoreError> {
        if let Some(shard) = self.shard(channel)? {
            return Ok(shard);
        }
        let mut shards = self.shards.write().map_err(|_| poisoned())?;
        Ok(Arc::clone(
            shards
                .entry(channel.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ChannelLog::new()))),
        ))
    }
}

impl Default for InMemoryChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable {
        reason: "store lock poisoned".to_string(),
    }
}

impl ChannelStore for InMemoryChannelStore {
    fn append(
        &self,
        channel: &ChannelPath,
        payload: serde_json::Value,
        visibility: Visibility,
    ) -> Result<u64, StoreError> {
        let shard = self.shard_or_create(channel)?;
        let mut log = shard.lock().map_err(|_| poisoned())?;

        let sequence = log.next_sequence;
        log.entries.push_back(Arc::new(BusMessage::new(
            channel.clone(),
            sequence,
            payload,
            visibility,
        )));
        log.next_sequence += 1;

        trace!(channel = %channel, sequence, "Message appended");
        Ok(sequence)
    }

    fn read(
        &self,
        channel: &ChannelPath,
        since: u64,
        max: usize,
    ) -> Result<Vec<Arc<BusMessage>>, StoreError> {
        let Some(shard) = self.shard(channel)? else {
            return Ok(Vec::new());
        };
        let log = shard.lock().map_err(|_| poisoned())?;

        // Entries are ascending by sequence; skip everything <= since.
        let start = log.entries.partition_point(|m| m.sequence <= since);
        Ok(log.entries.iter().skip(start).take(max).cloned().collect())
    }

    fn latest_sequence(&self, channel: &ChannelPath) -> Result<u64, StoreError> {
        let Some(shard) = self.shard(channel)? else {
            return Ok(0);
        };
        let log = shard.lock().map_err(|_| poisoned())?;
        Ok(log.next_sequence - 1)
    }

    fn oldest_sequence(&self, channel: &ChannelPath) -> Result<Option<u64>, StoreError> {
        let Some(shard) = self.shard(channel)? else {
            return Ok(None);
        };
        let log = shard.lock().map_err(|_| poisoned())?;
        Ok(log.entries.front().map(|m| m.sequence))
    }

    fn channels(&self) -> Result<Vec<ChannelPath>, StoreError> {
        Ok(self
            .shards
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .cloned()
            .collect())
    }

    fn truncate_below(&self, channel: &ChannelPath, keep_from: u64) -> Result<usize, StoreError> {
        let Some(shard) = self.shard(channel)? else {
            return Ok(0);
        };
        let mut log = shard.lock().map_err(|_| poisoned())?;

        let mut evicted = 0;
        while log
            .entries
            .front()
            .is_some_and(|m| m.sequence < keep_from)
        {
            log.entries.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            debug!(channel = %channel, evicted, keep_from, "Backlog truncated");
        }
        Ok(evicted)
    }
}
