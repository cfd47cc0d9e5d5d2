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

//! The abstract on-disk key-value store (§6) and the key layout (§6,
//! reproduced here for interoperability with other implementations of
//! the same wire/storage conventions).

use async_trait::async_trait;

use crate::error::Error;

/// One operation inside a [`KvStore::batch`] call.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// The on-disk key-value store is an external collaborator (§1); this
/// trait is the only seam through which the channel state machine and
/// the replay guard reach it.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    async fn del(&self, key: &[u8]) -> Result<(), Error>;

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), Error>;

    /// Yields `{key, value}` pairs in key order within `[gte, lte]`.
    async fn create_read_stream(
        &self,
        gte: Vec<u8>,
        lte: Vec<u8>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error>;
}

/// The persisted key prefixes (§6), reproduced verbatim so that a
/// differently-written node sharing the same store stays interoperable.
pub mod keys {
    const PAYMENTS_PREFIX: &str = "payments-";

    fn payments_key(suffix: &str, channel_id: &[u8; 32]) -> Vec<u8> {
        let mut key = Vec::with_capacity(PAYMENTS_PREFIX.len() + suffix.len() + 32);
        key.extend_from_slice(PAYMENTS_PREFIX.as_bytes());
        key.extend_from_slice(suffix.as_bytes());
        key.extend_from_slice(channel_id);
        key
    }

    pub fn key(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("key-", channel_id)
    }

    pub fn tx(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("tx-", channel_id)
    }

    pub fn restore_tx(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("restoreTx-", channel_id)
    }

    pub fn stashed_restore_tx(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("stashedRestoreTx-", channel_id)
    }

    pub fn index(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("index-", channel_id)
    }

    pub fn current_value(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("currentValue-", channel_id)
    }

    pub fn on_chain_balance(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("onChainBalance-", channel_id)
    }

    pub fn initial_balance(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("initialBalance-", channel_id)
    }

    pub fn total_balance(channel_id: &[u8; 32]) -> Vec<u8> {
        payments_key("totalBalance-", channel_id)
    }

    /// `"payments-challenge-" ‖ channelId(32) ‖ challenge(33)`.
    pub fn challenge(channel_id: &[u8; 32], challenge_point: &[u8; 33]) -> Vec<u8> {
        let mut key = Vec::with_capacity(PAYMENTS_PREFIX.len() + "challenge-".len() + 32 + 33);
        key.extend_from_slice(PAYMENTS_PREFIX.as_bytes());
        key.extend_from_slice(b"challenge-");
        key.extend_from_slice(channel_id);
        key.extend_from_slice(challenge_point);
        key
    }

    /// `"packet-tag-" ‖ tag(16)`.
    pub fn packet_tag(tag: &[u8; 16]) -> Vec<u8> {
        let mut key = Vec::with_capacity(11 + 16);
        key.extend_from_slice(b"packet-tag-");
        key.extend_from_slice(tag);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn key_layout_matches_prefixes() {
        let channel_id = [0x01; 32];
        assert!(keys::tx(&channel_id).starts_with(b"payments-tx-"));
        assert!(keys::restore_tx(&channel_id).starts_with(b"payments-restoreTx-"));
        assert!(keys::packet_tag(&[0x02; 16]).starts_with(b"packet-tag-"));
    }
}
