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

//! Curve and key-derivation primitives used by the onion packet format.
//!
//! Every derivation here is deterministic in the shared secret: the same
//! `s` always yields the same PRG stream, MAC key, and tag, which a ticket
//! holder relies on when it re-derives a secret during redemption. Nothing
//! in this crate reads from system randomness except ephemeral scalar
//! generation at packet construction time.

#[macro_use]
extern crate amplify_derive;

mod error;
mod primitives;

pub use error::Error;
pub use primitives::{
    accumulate_scalar, blind, blinding_factor, derive_hashed_key, derive_relay_transaction_key,
    derive_secret, derive_tag_parameters, derive_transaction_key, hash, mac, prg, random_scalar,
    stream_cipher, verify_mac, xor, GroupElement, Scalar, SharedSecret,
    GROUP_ELEMENT_SIZE, MAC_SIZE, TAG_SIZE,
};

/// Runs a fixed-vector round trip of every primitive. A failure here is a
/// class-3 fatal error: the node cannot safely forward traffic with a
/// broken crypto primitive.
pub fn selftest() -> Result<(), Error> {
    let sk = secp256k1::SecretKey::from_slice(&[0x11; 32])
        .map_err(|_| Error::SelfTestFailed)?;
    let alpha = GroupElement::from_secret(&secp256k1::SecretKey::from_slice(
        &[0x22; 32],
    )?);

    let s1 = derive_secret(&alpha, &sk)?;
    let s2 = derive_secret(&alpha, &sk)?;
    if s1.as_bytes() != s2.as_bytes() {
        return Err(Error::SelfTestFailed);
    }

    let stream1 = prg(&s1, 64);
    let stream2 = prg(&s1, 64);
    if stream1 != stream2 {
        return Err(Error::SelfTestFailed);
    }

    let tag1 = mac(&s1, b"hopr-selftest");
    let tag2 = mac(&s1, b"hopr-selftest");
    if !verify_mac(&s1, b"hopr-selftest", &tag1) || tag1 != tag2 {
        return Err(Error::SelfTestFailed);
    }

    let data = b"the quick brown fox";
    let enc = stream_cipher(&s1, data);
    let dec = stream_cipher(&s1, &enc);
    if dec != data {
        return Err(Error::SelfTestFailed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selftest_passes() {
        selftest().expect("crypto self-test must pass");
    }
}
