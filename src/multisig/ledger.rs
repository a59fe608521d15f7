//! Approval ledger
//!
//! Records which owners approved which request hash. Entries outlive failed
//! executions and become unreachable once the nonce moves past them.

use crate::crypto::{Address, Hash256};
use crate::multisig::owners::OwnerSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Approvals recorded for a single request hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    /// Nonce the hash was computed for
    pub nonce: u64,
    /// Approving principal -> time of first approval
    pub approvals: BTreeMap<Address, DateTime<Utc>>,
}

/// Per-hash, per-owner approval state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLedger {
    entries: HashMap<Hash256, ApprovalEntry>,
}

impl ApprovalLedger {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record an approval. Returns `false` if `approver` had already
    /// approved `hash`, in which case nothing changes.
    pub fn record(&mut self, hash: Hash256, nonce: u64, approver: Address) -> bool {
        let entry = self.entries.entry(hash).or_insert_with(|| ApprovalEntry {
            nonce,
            approvals: BTreeMap::new(),
        });

        if entry.approvals.contains_key(&approver) {
            return false;
        }
        entry.approvals.insert(approver, Utc::now());
        true
    }

    pub fn has_approved(&self, hash: &Hash256, approver: &Address) -> bool {
        self.entries
            .get(hash)
            .is_some_and(|e| e.approvals.contains_key(approver))
    }

    /// Every principal that ever approved `hash`, including removed owners
    pub fn approvers(&self, hash: &Hash256) -> Vec<Address> {
        self.entries
            .get(hash)
            .map(|e| e.approvals.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Count approvals for `hash` from principals that are owners now
    pub fn tally(&self, hash: &Hash256, owners: &OwnerSet) -> usize {
        self.entries
            .get(hash)
            .map(|e| e.approvals.keys().filter(|a| owners.is_owner(a)).count())
            .unwrap_or(0)
    }

    pub fn entry(&self, hash: &Hash256) -> Option<&ApprovalEntry> {
        self.entries.get(hash)
    }

    /// Drop entries for nonces below `nonce`. Returns how many were removed.
    pub fn purge_before(&mut self, nonce: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.nonce >= nonce);
        before - self.entries.len()
    }

    /// Hashes with at least one approval at `nonce`
    pub fn pending_at(&self, nonce: u64) -> Vec<(&Hash256, &ApprovalEntry)> {
        self.entries.iter().filter(|(_, e)| e.nonce == nonce).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
