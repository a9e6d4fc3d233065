//! Identity cache keyed by function object identity

use std::collections::BTreeSet;
use std::sync::Arc;

use codehash_core::{FunctionId, HashId};
use dashmap::DashMap;

/// A memoized identity and every function its computation reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedIdentity {
    pub hash: HashId,
    /// A computation that has one of these on its stack must not reuse
    /// `hash`: it would have seen a back-reference instead.
    pub reach: Arc<BTreeSet<FunctionId>>,
}

/// Memoized identities. Entries live as long as the cache; there is no
/// eviction.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: DashMap<FunctionId, CachedIdentity>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FunctionId) -> Option<CachedIdentity> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    /// Store `identity` unless another thread got there first; returns the
    /// entry that ends up in the cache.
    pub fn insert_if_absent(&self, id: FunctionId, identity: CachedIdentity) -> CachedIdentity {
        self.entries.entry(id).or_insert(identity).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
