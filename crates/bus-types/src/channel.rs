//! # Channel Paths and Patterns
//!
//! Channels are identified by hierarchical string paths (`/logout`,
//! `/topic/42`). Subscriptions watch either an exact path or a whole
//! hierarchy via a trailing `/*` wildcard.

use crate::errors::{ChannelPathError, PatternError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated hierarchical channel path.
///
/// Rules:
///
/// - starts with `/`
/// - at least one segment
/// - no empty segments (`//`), no trailing `/`
/// - segments contain no whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelPath(String);

impl ChannelPath {
    /// Parse and validate a channel path.
    ///
    /// # Errors
    ///
    /// - `ChannelPathError::Empty` - the input is empty
    /// - `ChannelPathError::MissingLeadingSlash` - does not start with `/`
    /// - `ChannelPathError::EmptySegment` - contains `//` or ends with `/`
    /// - `ChannelPathError::InvalidSegment` - a segment contains whitespace
    pub fn new(path: impl Into<String>) -> Result<Self, ChannelPathError> {
        let path = path.into();

        if path.is_empty() {
            return Err(ChannelPathError::Empty);
        }
        if !path.starts_with('/') {
            return Err(ChannelPathError::MissingLeadingSlash { path });
        }
        for segment in path[1..].split('/') {
            if segment.is_empty() {
                return Err(ChannelPathError::EmptySegment { path });
            }
            if segment.chars().any(char::is_whitespace) {
                return Err(ChannelPathError::InvalidSegment {
                    path: path.clone(),
                    segment: segment.to_string(),
                });
            }
        }

        Ok(Self(path))
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` equals `ancestor` or lies under its hierarchy.
    ///
    /// `/topic/42` is under `/topic`; `/topics` is not.
    #[must_use]
    pub fn is_under(&self, ancestor: &ChannelPath) -> bool {
        self == ancestor
            || (self.0.len() > ancestor.0.len()
                && self.0.starts_with(&ancestor.0)
                && self.0.as_bytes()[ancestor.0.len()] == b'/')
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelPath {
    type Error = ChannelPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelPath> for String {
    fn from(path: ChannelPath) -> Self {
        path.0
    }
}

/// A subscription's channel interest: an exact path or a hierarchy prefix.
///
/// The textual form of a prefix pattern is the prefix path followed by `/*`:
/// `/topic/*` matches `/topic`, `/topic/42` and `/topic/42/edits`, but not
/// `/topics`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelPattern {
    /// Matches exactly one channel path.
    Exact(ChannelPath),
    /// Matches the prefix path itself and every path under it.
    Prefix(ChannelPath),
}

impl ChannelPattern {
    /// Parse a pattern string. A trailing `/*` denotes a prefix pattern.
    ///
    /// # Errors
    ///
    /// `PatternError::InvalidPath` if the underlying path fails validation.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        match pattern.strip_suffix("/*") {
            Some(prefix) => Ok(Self::Prefix(ChannelPath::new(prefix)?)),
            None => Ok(Self::Exact(ChannelPath::new(pattern)?)),
        }
    }

    /// Check whether a concrete channel path matches this pattern.
    #[must_use]
    pub fn matches(&self, channel: &ChannelPath) -> bool {
        match self {
            Self::Exact(path) => channel == path,
            Self::Prefix(prefix) => channel.is_under(prefix),
        }
    }
}

impl fmt::Display for ChannelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => f.write_str(path.as_str()),
            Self::Prefix(prefix) => write!(f, "{prefix}/*"),
        }
    }
}
