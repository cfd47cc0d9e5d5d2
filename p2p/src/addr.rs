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

use std::fmt;

use hopr_crypto::hash;
use secp256k1::PublicKey;

use crate::error::Error;

/// On-chain account address (20 bytes, Ethereum-style). Ordering is plain
/// byte-lexicographic: `Address` implements `Ord` directly from its bytes,
/// which is exactly the ordering the funding direction rule (§4.5) needs to
/// decide partyA vs partyB.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A relay's routing identity: the compressed secp256k1 public key used to
/// derive per-hop shared secrets. Distinct from [`Address`] — the onion
/// layer and the on-chain channel use the same curve but address a peer
/// differently (full point vs. 20-byte account).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PeerId(PublicKey);

impl PeerId {
    pub fn from_public_key(key: PublicKey) -> Self {
        PeerId(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        PublicKey::from_slice(bytes)
            .map(PeerId)
            .map_err(|_| Error::InvalidGroupElement)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.0
    }

    /// The 20-byte on-chain address derived from this peer's public key:
    /// the low 20 bytes of `hash(pubkey)`, the same convention an
    /// Ethereum-style chain backend uses to derive an address from a key.
    pub fn to_address(&self) -> Address {
        let digest = hash(&self.0.serialize());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Address(bytes)
    }
}

/// Channel identifier: `H(accountA ‖ accountB)` with `accountA ≤ accountB`,
/// per §3's invariant. Constructing a `ChannelId` always normalizes the
/// argument order, so callers never need to sort themselves.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChannelId([u8; 32]);

impl ChannelId {
    pub fn new(a: Address, b: Address) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let mut preimage = Vec::with_capacity(40);
        preimage.extend_from_slice(lo.as_bytes());
        preimage.extend_from_slice(hi.as_bytes());
        ChannelId(hash(&preimage))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ChannelId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
