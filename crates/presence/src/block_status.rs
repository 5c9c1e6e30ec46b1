//! Per-user block flags pushed by the hub.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use carelink_core::types::UserId;

/// Map from user id to "blocked by an administrator".
///
/// Written only by the channel's driver task as `user_status_updated`
/// frames arrive (last write wins); read from anywhere. Entries are never
/// evicted: they are keyed by user id, so a stale entry is overwritten by
/// the next update for that user.
#[derive(Debug, Default)]
pub struct BlockStatusMap {
    entries: RwLock<HashMap<UserId, bool>>,
}

impl BlockStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` for users the hub never mentioned.
    pub fn is_blocked(&self, user_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
            .unwrap_or(false)
    }

    /// Record the latest flag for `user_id`, returning the previous one.
    pub(crate) fn apply(&self, user_id: &str, blocked: bool) -> Option<bool> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), blocked)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every known flag.
    pub fn snapshot(&self) -> HashMap<UserId, bool> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
