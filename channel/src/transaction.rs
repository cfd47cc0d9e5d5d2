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

//! Signed channel updates (§3's `Transaction`, §4.5's `transfer`). A
//! transaction's `value` field carries the *new* partyA balance after the
//! transfer, not a delta — that makes "monotone in the agreed direction"
//! (§3) a direct comparison between two absolute values.

use hopr_crypto::hash;
use hopr_p2p::addr::PeerId;
use hopr_p2p::packet::Transaction;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::error::Error;

fn signing_preimage(channel_id: &[u8; 32], index: u64, value: u64) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(32 + 8 + 8);
    preimage.extend_from_slice(channel_id);
    preimage.extend_from_slice(&index.to_be_bytes());
    preimage.extend_from_slice(&value.to_be_bytes());
    hash(&preimage)
}

/// A [`Transaction`] together with the signer's recoverable ECDSA
/// signature. The embedded `curve_point` carries the signer's own public
/// key in compressed form, so a hop can check identity without performing
/// EC recovery on the hot path; `recovery` still lets a counterparty
/// recover it independently when auditing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignedTransaction {
    pub transaction: Transaction,
}

impl SignedTransaction {
    /// Builds and signs a transfer moving the channel to `new_party_a_balance`
    /// at `index`, signed by `signing_key`.
    pub fn sign(
        channel_id: [u8; 32],
        index: u64,
        new_party_a_balance: u64,
        signing_key: &SecretKey,
    ) -> Result<Self, Error> {
        let digest = signing_preimage(&channel_id, index, new_party_a_balance);
        let message =
            Message::from_slice(&digest).map_err(|_| Error::InvalidSignature)?;
        let recoverable = SECP256K1.sign_ecdsa_recoverable(&message, signing_key);
        let (recovery_id, sig_bytes) = recoverable.serialize_compact();
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&sig_bytes);
        let public_key = PublicKey::from_secret_key(SECP256K1, signing_key);

        Ok(SignedTransaction {
            transaction: Transaction {
                channel_id,
                index,
                value: new_party_a_balance,
                curve_point: public_key.serialize(),
                signature,
                recovery: recovery_id.to_i32() as u8,
            },
        })
    }

    /// Recovers and returns the signer's identity, verifying the
    /// signature against the embedded `channelId ‖ index ‖ value` (§3:
    /// "the signature recovers to the counterparty").
    pub fn verify_and_recover(&self) -> Result<PeerId, Error> {
        let digest = signing_preimage(
            &self.transaction.channel_id,
            self.transaction.index,
            self.transaction.value,
        );
        let message =
            Message::from_slice(&digest).map_err(|_| Error::InvalidSignature)?;
        let recovery_id = RecoveryId::from_i32(self.transaction.recovery as i32)
            .map_err(|_| Error::InvalidRecoveryId)?;
        let recoverable =
            RecoverableSignature::from_compact(&self.transaction.signature, recovery_id)
                .map_err(|_| Error::InvalidSignature)?;
        let recovered = SECP256K1
            .recover_ecdsa(&message, &recoverable)
            .map_err(|_| Error::InvalidSignature)?;

        let embedded = PublicKey::from_slice(&self.transaction.curve_point)
            .map_err(|_| Error::InvalidSignature)?;
        if recovered != embedded {
            return Err(Error::InvalidSignature);
        }
        Ok(PeerId::from_public_key(recovered))
    }
}

/// `embeddedMoney(tx, prev, currentValue)` (§4.6 step 2): how much value
/// this hop receives from `counterparty`, given the channel's previous
/// partyA balance and the transaction's new one.
///
/// Transfers from partyA reduce `partyABalance`; transfers from partyB
/// reduce `balance - partyABalance` (§4.5's funding direction rule). So
/// the signed delta in partyA's balance is the amount received by
/// whichever side is *not* partyA, and its negation is received by
/// partyA.
pub fn embedded_money(
    previous_party_a_balance: u64,
    new_party_a_balance: u64,
    counterparty_is_party_a: bool,
) -> i64 {
    let delta = new_party_a_balance as i64 - previous_party_a_balance as i64;
    if counterparty_is_party_a {
        -delta
    } else {
        delta
    }
}
