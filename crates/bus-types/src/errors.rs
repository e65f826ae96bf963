//! # Error Types
//!
//! The bus error taxonomy. Deliberately small:
//!
//! - Storage failures surface synchronously to producers (fail closed).
//! - Operating on an unknown subscription handle is a no-op, not an error.
//! - A long-poll timeout yields an empty batch, not an error.
//! - Retention conflicts are internal: logged and retried on the next sweep.

use thiserror::Error;

/// Errors from channel path validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelPathError {
    /// The path is empty.
    #[error("Channel path is empty")]
    Empty,

    /// The path does not start with `/`.
    #[error("Channel path {path:?} must start with '/'")]
    MissingLeadingSlash { path: String },

    /// The path contains an empty segment (`//` or trailing `/`).
    #[error("Channel path {path:?} contains an empty segment")]
    EmptySegment { path: String },

    /// A segment contains whitespace.
    #[error("Channel path {path:?} has invalid segment {segment:?}")]
    InvalidSegment { path: String, segment: String },
}

/// Errors from channel pattern parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern's path portion failed validation.
    #[error("Invalid pattern path: {0}")]
    InvalidPath(#[from] ChannelPathError),
}

/// Errors from the channel store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store is unreachable. Producers must retry; they must
    /// not assume delivery without an explicit success.
    #[error("Channel store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors surfaced to producers on publish.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The message could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The target channel path is malformed.
    #[error("Invalid channel: {0}")]
    InvalidChannel(#[from] ChannelPathError),
}
