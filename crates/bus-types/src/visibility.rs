//! # Subscriber Identity and Visibility Filters
//!
//! A message may carry a visibility filter restricting which subscribers
//! receive it. Filters are evaluated per subscriber at delivery time, never
//! at publish time, so eligibility changes only affect messages not yet
//! delivered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Who a subscriber is. Connections may be anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriberId {
    /// An authenticated user.
    User(u64),
    /// An anonymous connection, keyed by a per-connection id.
    Anonymous(Uuid),
}

impl SubscriberId {
    /// Create a fresh anonymous identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::Anonymous(Uuid::new_v4())
    }
}

/// A subscriber's identity plus the group memberships used when evaluating
/// group-scoped visibility filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberIdentity {
    /// The subscriber id.
    pub id: SubscriberId,
    /// Groups the subscriber belongs to. Empty for anonymous connections.
    pub groups: BTreeSet<u64>,
}

impl SubscriberIdentity {
    /// An authenticated user with no group memberships.
    #[must_use]
    pub fn user(user_id: u64) -> Self {
        Self {
            id: SubscriberId::User(user_id),
            groups: BTreeSet::new(),
        }
    }

    /// An authenticated user with group memberships.
    #[must_use]
    pub fn user_in_groups(user_id: u64, groups: impl IntoIterator<Item = u64>) -> Self {
        Self {
            id: SubscriberId::User(user_id),
            groups: groups.into_iter().collect(),
        }
    }

    /// A fresh anonymous identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: SubscriberId::anonymous(),
            groups: BTreeSet::new(),
        }
    }
}

/// The visibility filter attached to a message.
///
/// A tagged union of the filter shapes the producer API exposes
/// (`user_ids` / `group_ids` / neither); not a general predicate language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Deliverable to every subscriber, anonymous included.
    Public,
    /// Deliverable only to the named authenticated users.
    Users(BTreeSet<u64>),
    /// Deliverable only to members of the named groups.
    Groups(BTreeSet<u64>),
    /// Deliverable to the named users and to members of the named groups.
    UsersOrGroups {
        users: BTreeSet<u64>,
        groups: BTreeSet<u64>,
    },
}

impl Visibility {
    /// Build a filter from the producer-facing options. Both sets present
    /// means "user in `user_ids` OR member of a group in `group_ids`";
    /// both absent means public.
    #[must_use]
    pub fn from_options(
        user_ids: Option<BTreeSet<u64>>,
        group_ids: Option<BTreeSet<u64>>,
    ) -> Self {
        match (user_ids, group_ids) {
            (Some(users), None) => Self::Users(users),
            (None, Some(groups)) => Self::Groups(groups),
            (Some(users), Some(groups)) => {
                // Widest option wins per recipient: either set grants access.
                if users.is_empty() {
                    Self::Groups(groups)
                } else if groups.is_empty() {
                    Self::Users(users)
                } else {
                    Self::UsersOrGroups { users, groups }
                }
            }
            (None, None) => Self::Public,
        }
    }

    /// Check whether a subscriber may receive a message carrying this filter.
    #[must_use]
    pub fn allows(&self, subscriber: &SubscriberIdentity) -> bool {
        match self {
            Self::Public => true,
            Self::Users(users) => match subscriber.id {
                SubscriberId::User(id) => users.contains(&id),
                SubscriberId::Anonymous(_) => false,
            },
            Self::Groups(groups) => !subscriber.groups.is_disjoint(groups),
            Self::UsersOrGroups { users, groups } => {
                let user_ok = match subscriber.id {
                    SubscriberId::User(id) => users.contains(&id),
                    SubscriberId::Anonymous(_) => false,
                };
                user_ok || !subscriber.groups.is_disjoint(groups)
            }
        }
    }
}
