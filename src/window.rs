//! Lookback-limited membership set for a single filter instance.
//!
//! All state lives in the injected [`MembershipStore`]; the window itself only
//! knows its key and how entries are ranked.
//!
//! Insertion relies on the store's add-if-absent primitive, so at most one
//! caller observes a fingerprint as unique. Eviction is a separate follow-up
//! call and is not atomic with the insert: concurrent bursts may push the
//! set past the lookback until the next eviction pass catches up.

use crate::error::Result;
use crate::storage::MembershipStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// How entries are ranked, which decides what eviction removes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub enum EvictionPolicy {
    /// Every entry is ranked 0; eviction takes the first member in the
    /// store's tie-break order, which for Redis is lexicographic.
    #[default]
    SharedRank,
    /// Entries are ranked by a per-window counter; eviction is strict FIFO.
    InsertionOrder,
}

/// Read-only view of the current window contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Snapshot {
    pub length: usize,
    pub keys: Vec<String>,
}

pub struct UniquenessWindow {
    store: Arc<dyn MembershipStore>,
    key: String,
    sequence_key: String,
    policy: EvictionPolicy,
}

impl UniquenessWindow {
    pub fn new(store: Arc<dyn MembershipStore>, key: &str) -> Self {
        Self::with_policy(store, key, EvictionPolicy::default())
    }

    pub fn with_policy(
        store: Arc<dyn MembershipStore>,
        key: &str,
        policy: EvictionPolicy,
    ) -> Self {
        Self {
            store,
            key: key.to_string(),
            // filter windows are keyed "uniq{id}", never "seq:"
            sequence_key: format!("seq:{key}"),
            policy,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sequence_key(&self) -> &str {
        &self.sequence_key
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Adds the fingerprint if absent. Returns true when it was new.
    pub fn try_insert(&self, fingerprint: &str) -> Result<bool> {
        let rank = match self.policy {
            EvictionPolicy::SharedRank => 0,
            // burns a sequence number on duplicates, gaps are harmless
            EvictionPolicy::InsertionOrder => {
                self.store.next_sequence(&self.sequence_key)?
            }
        };
        let added = self.store.add_if_absent(&self.key, rank, fingerprint)?;
        debug!(key = %self.key, fingerprint, added, "try_insert");
        Ok(added)
    }

    /// Counts every entry regardless of policy, so members written under a
    /// previous policy still count toward the lookback.
    pub fn size(&self) -> Result<usize> {
        self.store.count_in_range(&self.key, 0, i64::MAX)
    }

    /// Removes the first entry once the window holds exactly `lookback`
    /// entries. A lookback of 0 never evicts. Returns how many entries
    /// were removed.
    pub fn evict_if_full(&self, lookback: usize) -> Result<usize> {
        if lookback == 0 {
            return Ok(0);
        }
        let length = self.size()?;
        if length != lookback {
            return Ok(0);
        }

        let oldest = self.store.range_by_rank(&self.key, 0, 0)?;
        let removed = self.store.remove(&self.key, &oldest)?;
        debug!(key = %self.key, ?oldest, lookback, "evicted");
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.delete_key(&self.key)?;
        if self.policy == EvictionPolicy::InsertionOrder {
            self.store.delete_key(&self.sequence_key)?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            length: self.size()?,
            keys: self.store.range_by_rank(&self.key, 0, -1)?,
        })
    }
}
