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

//! The fixed-size packet frame: `Header ‖ Transaction ‖ Challenge ‖
//! Message`. No length prefixes anywhere in this module — a frame that is
//! not exactly [`sizes::PACKET_SIZE`] bytes is rejected at decode time,
//! per the data model's "no length prefixes" invariant.

use crate::error::Error;

/// All fixed sizes that make up the wire frame, computed once here rather
/// than duplicated at each call site.
pub mod sizes {
    use hopr_crypto::GROUP_ELEMENT_SIZE;

    /// Compressed secp256k1 point carried in the header's `alpha` field and
    /// in the `curvePoint` field of both [`super::Transaction`] and
    /// [`super::Challenge`].
    pub const GROUP_ELEMENT_SIZE_BYTES: usize = GROUP_ELEMENT_SIZE;

    /// Bytes of on-chain address carried per routing hop.
    pub const NEXT_HOP_ADDR_SIZE: usize = 20;
    /// Per-hop MAC embedded alongside the next-hop address in beta.
    pub const PER_HOP_MAC_SIZE: usize = 21;
    /// One hop's worth of the beta ciphertext.
    pub const PER_HOP_ROUTING_BYTES: usize = NEXT_HOP_ADDR_SIZE + PER_HOP_MAC_SIZE;
    /// HOPR's historical default path length.
    pub const MAX_HOPS: usize = 4;

    pub const BETA_SIZE: usize = MAX_HOPS * PER_HOP_ROUTING_BYTES;
    pub const HEADER_MAC_SIZE: usize = 16;
    pub const HEADER_SIZE: usize = GROUP_ELEMENT_SIZE_BYTES + BETA_SIZE + HEADER_MAC_SIZE;

    pub const CHANNEL_ID_SIZE: usize = 32;
    pub const SIGNATURE_SIZE: usize = 64;
    pub const RECOVERY_SIZE: usize = 1;

    pub const TRANSACTION_SIZE: usize = CHANNEL_ID_SIZE
        + 8  // index
        + 8  // value
        + GROUP_ELEMENT_SIZE_BYTES
        + SIGNATURE_SIZE
        + RECOVERY_SIZE;

    pub const CHALLENGE_SIZE: usize =
        GROUP_ELEMENT_SIZE_BYTES + SIGNATURE_SIZE + RECOVERY_SIZE;

    pub const MESSAGE_SIZE: usize = 500;

    pub const PACKET_SIZE: usize = HEADER_SIZE + TRANSACTION_SIZE + CHALLENGE_SIZE + MESSAGE_SIZE;
}

use sizes::*;

/// One hop's routing slot inside beta, once peeled: the next hop's address
/// and the MAC that protects the remaining (shorter) beta.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RoutingSlot {
    pub next_hop: [u8; NEXT_HOP_ADDR_SIZE],
    pub mac: [u8; PER_HOP_MAC_SIZE],
}

impl RoutingSlot {
    pub fn encode(&self) -> [u8; PER_HOP_ROUTING_BYTES] {
        let mut buf = [0u8; PER_HOP_ROUTING_BYTES];
        buf[..NEXT_HOP_ADDR_SIZE].copy_from_slice(&self.next_hop);
        buf[NEXT_HOP_ADDR_SIZE..].copy_from_slice(&self.mac);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PER_HOP_ROUTING_BYTES {
            return Err(Error::WrongFrameSize {
                expected: PER_HOP_ROUTING_BYTES,
                actual: bytes.len(),
            });
        }
        let mut next_hop = [0u8; NEXT_HOP_ADDR_SIZE];
        let mut mac = [0u8; PER_HOP_MAC_SIZE];
        next_hop.copy_from_slice(&bytes[..NEXT_HOP_ADDR_SIZE]);
        mac.copy_from_slice(&bytes[NEXT_HOP_ADDR_SIZE..]);
        Ok(RoutingSlot { next_hop, mac })
    }
}

/// `alpha ‖ beta ‖ mac`: the routing header a hop must verify before
/// touching anything else in the frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Header {
    pub alpha: [u8; GROUP_ELEMENT_SIZE_BYTES],
    pub beta: [u8; BETA_SIZE],
    pub mac: [u8; HEADER_MAC_SIZE],
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut offset = 0;
        buf[offset..offset + GROUP_ELEMENT_SIZE_BYTES].copy_from_slice(&self.alpha);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        buf[offset..offset + BETA_SIZE].copy_from_slice(&self.beta);
        offset += BETA_SIZE;
        buf[offset..offset + HEADER_MAC_SIZE].copy_from_slice(&self.mac);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != HEADER_SIZE {
            return Err(Error::WrongFrameSize {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let mut alpha = [0u8; GROUP_ELEMENT_SIZE_BYTES];
        let mut beta = [0u8; BETA_SIZE];
        let mut mac = [0u8; HEADER_MAC_SIZE];
        let mut offset = 0;
        alpha.copy_from_slice(&bytes[offset..offset + GROUP_ELEMENT_SIZE_BYTES]);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        beta.copy_from_slice(&bytes[offset..offset + BETA_SIZE]);
        offset += BETA_SIZE;
        mac.copy_from_slice(&bytes[offset..offset + HEADER_MAC_SIZE]);
        Ok(Header { alpha, beta, mac })
    }
}

/// The embedded, per-hop-re-encrypted channel update.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
    pub channel_id: [u8; CHANNEL_ID_SIZE],
    pub index: u64,
    pub value: u64,
    pub curve_point: [u8; GROUP_ELEMENT_SIZE_BYTES],
    pub signature: [u8; SIGNATURE_SIZE],
    pub recovery: u8,
}

impl Transaction {
    pub fn encode(&self) -> [u8; TRANSACTION_SIZE] {
        let mut buf = [0u8; TRANSACTION_SIZE];
        let mut offset = 0;
        buf[offset..offset + CHANNEL_ID_SIZE].copy_from_slice(&self.channel_id);
        offset += CHANNEL_ID_SIZE;
        buf[offset..offset + 8].copy_from_slice(&self.index.to_be_bytes());
        offset += 8;
        buf[offset..offset + 8].copy_from_slice(&self.value.to_be_bytes());
        offset += 8;
        buf[offset..offset + GROUP_ELEMENT_SIZE_BYTES].copy_from_slice(&self.curve_point);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        buf[offset..offset + SIGNATURE_SIZE].copy_from_slice(&self.signature);
        offset += SIGNATURE_SIZE;
        buf[offset] = self.recovery;
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != TRANSACTION_SIZE {
            return Err(Error::WrongFrameSize {
                expected: TRANSACTION_SIZE,
                actual: bytes.len(),
            });
        }
        let mut channel_id = [0u8; CHANNEL_ID_SIZE];
        let mut curve_point = [0u8; GROUP_ELEMENT_SIZE_BYTES];
        let mut signature = [0u8; SIGNATURE_SIZE];
        let mut offset = 0;
        channel_id.copy_from_slice(&bytes[offset..offset + CHANNEL_ID_SIZE]);
        offset += CHANNEL_ID_SIZE;
        let index = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let value = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        curve_point.copy_from_slice(&bytes[offset..offset + GROUP_ELEMENT_SIZE_BYTES]);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        signature.copy_from_slice(&bytes[offset..offset + SIGNATURE_SIZE]);
        offset += SIGNATURE_SIZE;
        let recovery = bytes[offset];
        if recovery > 3 {
            return Err(Error::InvalidRecoveryId);
        }
        Ok(Transaction {
            channel_id,
            index,
            value,
            curve_point,
            signature,
            recovery,
        })
    }

    /// Field-splits `bytes` without validating `recovery`'s range. Used
    /// when this struct is carrying still-encrypted ciphertext rather than
    /// a decoded transaction: between two adjacent hops the `transaction`
    /// section of a [`Packet`] is opaque to everyone else, and XOR-keystream
    /// ciphertext will almost never happen to land on a valid recovery id.
    pub fn from_raw_bytes(bytes: &[u8; TRANSACTION_SIZE]) -> Self {
        let mut channel_id = [0u8; CHANNEL_ID_SIZE];
        let mut curve_point = [0u8; GROUP_ELEMENT_SIZE_BYTES];
        let mut signature = [0u8; SIGNATURE_SIZE];
        let mut offset = 0;
        channel_id.copy_from_slice(&bytes[offset..offset + CHANNEL_ID_SIZE]);
        offset += CHANNEL_ID_SIZE;
        let index = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let value = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;
        curve_point.copy_from_slice(&bytes[offset..offset + GROUP_ELEMENT_SIZE_BYTES]);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        signature.copy_from_slice(&bytes[offset..offset + SIGNATURE_SIZE]);
        offset += SIGNATURE_SIZE;
        let recovery = bytes[offset];
        Transaction {
            channel_id,
            index,
            value,
            curve_point,
            signature,
            recovery,
        }
    }
}

/// A signature over the hashed key-half the next hop reveals upon correct
/// forwarding.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Challenge {
    pub curve_point: [u8; GROUP_ELEMENT_SIZE_BYTES],
    pub signature: [u8; SIGNATURE_SIZE],
    pub recovery: u8,
}

impl Challenge {
    pub fn encode(&self) -> [u8; CHALLENGE_SIZE] {
        let mut buf = [0u8; CHALLENGE_SIZE];
        let mut offset = 0;
        buf[offset..offset + GROUP_ELEMENT_SIZE_BYTES].copy_from_slice(&self.curve_point);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        buf[offset..offset + SIGNATURE_SIZE].copy_from_slice(&self.signature);
        offset += SIGNATURE_SIZE;
        buf[offset] = self.recovery;
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != CHALLENGE_SIZE {
            return Err(Error::WrongFrameSize {
                expected: CHALLENGE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut curve_point = [0u8; GROUP_ELEMENT_SIZE_BYTES];
        let mut signature = [0u8; SIGNATURE_SIZE];
        let mut offset = 0;
        curve_point.copy_from_slice(&bytes[offset..offset + GROUP_ELEMENT_SIZE_BYTES]);
        offset += GROUP_ELEMENT_SIZE_BYTES;
        signature.copy_from_slice(&bytes[offset..offset + SIGNATURE_SIZE]);
        offset += SIGNATURE_SIZE;
        let recovery = bytes[offset];
        if recovery > 3 {
            return Err(Error::InvalidRecoveryId);
        }
        Ok(Challenge {
            curve_point,
            signature,
            recovery,
        })
    }
}

/// The onion-encrypted payload. Intermediaries only ever see ciphertext;
/// the destination's final layer reveals the plaintext bytes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message(pub [u8; MESSAGE_SIZE]);

impl Message {
    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        self.0
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != MESSAGE_SIZE {
            return Err(Error::WrongFrameSize {
                expected: MESSAGE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; MESSAGE_SIZE];
        buf.copy_from_slice(bytes);
        Ok(Message(buf))
    }
}

/// `Header ‖ Transaction ‖ Challenge ‖ Message`, in that order, with no
/// length prefixes — the frame carried over the single libp2p stream.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Packet {
    pub header: Header,
    pub transaction: Transaction,
    pub challenge: Challenge,
    pub message: Message,
}

impl Packet {
    pub const SIZE: usize = PACKET_SIZE;

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        let mut offset = 0;
        buf[offset..offset + HEADER_SIZE].copy_from_slice(&self.header.encode());
        offset += HEADER_SIZE;
        buf[offset..offset + TRANSACTION_SIZE].copy_from_slice(&self.transaction.encode());
        offset += TRANSACTION_SIZE;
        buf[offset..offset + CHALLENGE_SIZE].copy_from_slice(&self.challenge.encode());
        offset += CHALLENGE_SIZE;
        buf[offset..offset + MESSAGE_SIZE].copy_from_slice(&self.message.encode());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PACKET_SIZE {
            return Err(Error::WrongFrameSize {
                expected: PACKET_SIZE,
                actual: bytes.len(),
            });
        }
        let mut offset = 0;
        let header = Header::decode(&bytes[offset..offset + HEADER_SIZE])?;
        offset += HEADER_SIZE;
        let transaction = Transaction::decode(&bytes[offset..offset + TRANSACTION_SIZE])?;
        offset += TRANSACTION_SIZE;
        let challenge = Challenge::decode(&bytes[offset..offset + CHALLENGE_SIZE])?;
        offset += CHALLENGE_SIZE;
        let message = Message::decode(&bytes[offset..offset + MESSAGE_SIZE])?;
        Ok(Packet {
            header,
            transaction,
            challenge,
            message,
        })
    }
}
