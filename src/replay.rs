// HOPR core: packet pipeline and payment-channel state machine
// Written in 2024-2026 by the HOPR core contributors
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! The replay guard (§4.4): a persistent set of 16-byte tags, `seenOrInsert`
//! contract is atomic — a concurrent transform of the same packet sees one
//! success and one rejection, never two successes.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hopr_channel::store::keys;
use hopr_channel::{Error, KvStore};
use tokio::sync::Mutex;

#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Inserts `tag` if absent. Returns `true` iff this call performed the
    /// insert (the packet is fresh); `false` means `tag` was already
    /// present (drop as a replay).
    async fn seen_or_insert(&self, tag: [u8; 16]) -> Result<bool, Error>;
}

/// A process-local replay guard backed by a `HashSet`, used by tests and
/// the mock harness. Not restart-safe — a real node uses
/// [`KvReplayGuard`] instead.
pub struct InMemoryReplayGuard {
    seen: Mutex<HashSet<[u8; 16]>>,
}

impl InMemoryReplayGuard {
    pub fn new() -> Self {
        InMemoryReplayGuard {
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for InMemoryReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplayGuard for InMemoryReplayGuard {
    async fn seen_or_insert(&self, tag: [u8; 16]) -> Result<bool, Error> {
        Ok(self.seen.lock().await.insert(tag))
    }
}

/// A replay guard backed by the abstract kv store, keyed `"packet-tag-" ‖
/// tag` (§6). The kv store interface has no native compare-and-swap, so
/// atomicity comes from a process-local lock serializing the
/// read-then-write — sufficient within one node, which is the only
/// scope `seenOrInsert`'s atomicity contract requires.
pub struct KvReplayGuard<K: KvStore> {
    store: Arc<K>,
    lock: Mutex<()>,
}

impl<K: KvStore> KvReplayGuard<K> {
    pub fn new(store: Arc<K>) -> Self {
        KvReplayGuard {
            store,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<K: KvStore> ReplayGuard for KvReplayGuard<K> {
    async fn seen_or_insert(&self, tag: [u8; 16]) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let key = keys::packet_tag(&tag);
        if self.store.get(&key).await?.is_some() {
            return Ok(false);
        }
        self.store.put(&key, &[]).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_insert_of_the_same_tag_is_rejected() {
        let guard = InMemoryReplayGuard::new();
        assert!(guard.seen_or_insert([0x01; 16]).await.unwrap());
        assert!(!guard.seen_or_insert([0x01; 16]).await.unwrap());
    }

    #[tokio::test]
    async fn distinct_tags_do_not_interfere() {
        let guard = InMemoryReplayGuard::new();
        assert!(guard.seen_or_insert([0x01; 16]).await.unwrap());
        assert!(guard.seen_or_insert([0x02; 16]).await.unwrap());
    }

    #[tokio::test]
    async fn kv_backed_guard_round_trips_through_the_store() {
        let store = Arc::new(hopr_channel::testing::MockKvStore::new());
        let guard = KvReplayGuard::new(store);
        assert!(guard.seen_or_insert([0x03; 16]).await.unwrap());
        assert!(!guard.seen_or_insert([0x03; 16]).await.unwrap());
    }
}
