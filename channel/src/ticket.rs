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

//! The Σ-challenge (§4.3) and the pending ticket it's embedded in (§3).

use hopr_crypto::hash;
use hopr_p2p::addr::{ChannelId, PeerId};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::error::Error;

/// A signature by the previous hop over a 32-byte payload that is either
/// `H(transactionKey)` (freshly created) or `H(hashedKeyHalf)` (updated
/// upon forwarding). §4.3's invariant: at hop `i` the challenge on entry
/// was signed by peer `i-1`; on exit, by peer `i`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Challenge {
    payload: [u8; 32],
    signature: [u8; 64],
    recovery: u8,
}

impl Challenge {
    /// `createChallenge(transactionKey, signer) -> Challenge`.
    pub fn create(transaction_key: &[u8; 32], signer: &SecretKey) -> Result<Self, Error> {
        Self::sign_payload(hash(transaction_key), signer)
    }

    fn sign_payload(payload: [u8; 32], signer: &SecretKey) -> Result<Self, Error> {
        let message = Message::from_slice(&payload).map_err(|_| Error::InvalidSignature)?;
        let recoverable = SECP256K1.sign_ecdsa_recoverable(&message, signer);
        let (recovery_id, sig_bytes) = recoverable.serialize_compact();
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&sig_bytes);
        Ok(Challenge {
            payload,
            signature,
            recovery: recovery_id.to_i32() as u8,
        })
    }

    fn recover(&self) -> Result<PeerId, Error> {
        let message = Message::from_slice(&self.payload).map_err(|_| Error::InvalidSignature)?;
        let recovery_id = RecoveryId::from_i32(self.recovery as i32)
            .map_err(|_| Error::InvalidRecoveryId)?;
        let recoverable = RecoverableSignature::from_compact(&self.signature, recovery_id)
            .map_err(|_| Error::InvalidSignature)?;
        let pubkey = SECP256K1
            .recover_ecdsa(&message, &recoverable)
            .map_err(|_| Error::InvalidSignature)?;
        Ok(PeerId::from_public_key(pubkey))
    }

    /// `getCounterparty(transactionKey) -> pubKey`: confirms `transactionKey`
    /// matches the bound payload, then recovers the signer.
    pub fn get_counterparty(&self, transaction_key: &[u8; 32]) -> Result<PeerId, Error> {
        if hash(transaction_key) != self.payload {
            return Err(Error::InvalidSignature);
        }
        self.recover()
    }

    /// `updateChallenge(hashedKeyHalf, signer)`: replaces the payload with
    /// `H(hashedKeyHalf)` and re-signs under `signer`.
    pub fn update(&mut self, hashed_key_half: &[u8; 32], signer: &SecretKey) -> Result<(), Error> {
        let updated = Self::sign_payload(hash(hashed_key_half), signer)?;
        *self = updated;
        Ok(())
    }

    pub fn payload(&self) -> &[u8; 32] {
        &self.payload
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    pub fn recovery(&self) -> u8 {
        self.recovery
    }

    /// Encodes as the wire `Challenge` (§6's 33-byte `curvePoint` slot):
    /// the 32-byte Σ-challenge payload occupies the low bytes, with the
    /// high byte reserved and always zero. The slot was sized for a curve
    /// point; the payload carried here is one byte narrower, so it is
    /// zero-extended rather than repacked at the cost of the frame's fixed
    /// offsets.
    pub fn to_wire(&self) -> hopr_p2p::packet::Challenge {
        let mut curve_point = [0u8; 33];
        curve_point[..32].copy_from_slice(&self.payload);
        hopr_p2p::packet::Challenge {
            curve_point,
            signature: self.signature,
            recovery: self.recovery,
        }
    }

    pub fn from_wire(wire: &hopr_p2p::packet::Challenge) -> Self {
        let mut payload = [0u8; 32];
        payload.copy_from_slice(&wire.curve_point[..32]);
        Challenge {
            payload,
            signature: wire.signature,
            recovery: wire.recovery,
        }
    }
}

/// Decides whether `digest`'s leading 8 bytes, read as a big-endian u64,
/// fall under `numerator / denominator` of the full `u64` range — the
/// `H(preImage) < winProb · 2^N` check from §3, with `N = 64`.
fn passes_threshold(digest: &[u8; 32], numerator: u64, denominator: u64) -> bool {
    let value = u64::from_be_bytes(digest[..8].try_into().unwrap());
    let threshold = ((u64::MAX as u128) * numerator as u128 / denominator as u128) as u64;
    value < threshold
}

/// A pending, probabilistic payment claim (§3). Every ticket carries a
/// real expected payment; only a winning ticket is ever redeemed on-chain.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Ticket {
    pub channel_id: ChannelId,
    pub challenge: Challenge,
    pub hashed_key_half: [u8; 32],
    pub amount: u64,
    pub win_prob_numerator: u64,
    pub win_prob_denominator: u64,
    pub on_chain_secret: [u8; 32],
}

impl Ticket {
    /// Whether this ticket is a winner and thus redeemable on-chain.
    pub fn is_winning(&self) -> bool {
        passes_threshold(
            &hash(&self.on_chain_secret),
            self.win_prob_numerator,
            self.win_prob_denominator,
        )
    }
}
