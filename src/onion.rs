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

//! Onion packet construction and per-hop transform (§4.2).
//!
//! `beta` never changes size as it crosses hops: each hop peels exactly
//! [`PER_HOP_ROUTING_BYTES`] off the front, and the sender pads an equal
//! amount of filler onto the back at construction time, so a packet routed
//! over one hop and a packet routed over [`MAX_HOPS`] are bit-indistinguishable
//! to anyone but the two endpoints. The filler-string construction below is
//! the classical Sphinx mix-format trick; `transform` is its exact inverse.

use hopr_crypto::{
    blind, blinding_factor, accumulate_scalar, derive_secret, derive_tag_parameters, mac, prg,
    stream_cipher, verify_mac, xor, GroupElement, Scalar, SharedSecret, TAG_SIZE,
};
use hopr_p2p::addr::{Address, PeerId};
use hopr_p2p::packet::{
    sizes::{BETA_SIZE, HEADER_MAC_SIZE, MESSAGE_SIZE, PER_HOP_MAC_SIZE, PER_HOP_ROUTING_BYTES},
    Challenge, Header, Message, RoutingSlot, Transaction,
};
use secp256k1::SecretKey;

use crate::error::{Classified, DropReason, FatalError};

/// A relay's routing identity and on-chain address, both known to the
/// sender up front when it chooses a path.
#[derive(Clone, Copy)]
pub struct Hop {
    pub peer_id: PeerId,
    pub address: Address,
}

/// Per-hop material derived once at path-construction time: the shared
/// secret and the `alpha` that hop will see. Every further per-hop key
/// (the beta-wrapping stream, the header MAC, the message layer, the
/// transaction key, the replay tag) is a labelled derivation of the one
/// shared secret here, never of fresh randomness (§4.1).
pub(crate) struct HopContext {
    pub(crate) shared_secret: SharedSecret,
    alpha: GroupElement,
    address: Address,
}

/// `alpha`/shared-secret sequence (§4.2 step 1): walks the path deriving
/// each hop's shared secret from an accumulated scalar, so the sender never
/// needs a hop's private key to compute what that hop will independently
/// derive via ECDH. `pub(crate)` so the pipeline driver can read
/// `contexts[0].shared_secret` when it needs the first hop's transaction key
/// to build the outgoing challenge, without this module duplicating that.
pub(crate) fn derive_path_contexts(
    path: &[Hop],
    ephemeral: &SecretKey,
) -> Result<Vec<HopContext>, Classified> {
    let mut acc: Scalar = *ephemeral;
    let mut contexts = Vec::with_capacity(path.len());
    for hop in path {
        let alpha = GroupElement::from_secret(&acc);
        let peer_point = GroupElement::from_public_key(*hop.peer_id.public_key());
        let shared_secret = derive_secret(&peer_point, &acc)?;
        let factor = blinding_factor(&alpha, &shared_secret)?;
        acc = accumulate_scalar(&acc, &factor)?;
        contexts.push(HopContext {
            shared_secret,
            alpha,
            address: hop.address,
        });
    }
    Ok(contexts)
}

/// The bytes a header MAC authenticates: `alpha ‖ beta`, always taken
/// together so the two can never be swapped between packets.
fn header_mac_preimage(alpha: &GroupElement, beta: &[u8; BETA_SIZE]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(hopr_crypto::GROUP_ELEMENT_SIZE + BETA_SIZE);
    buf.extend_from_slice(&alpha.to_bytes());
    buf.extend_from_slice(beta);
    buf
}

/// Computes the filler strings a shorter-than-`MAX_HOPS` path needs so its
/// final hop's beta is indistinguishable from a full-length one. Built
/// forwards over every hop but the last, each step borrowing one more
/// hop's PRG tail (the classical Sphinx filler-string recurrence).
fn generate_filler(contexts: &[HopContext]) -> Vec<u8> {
    let mut filler: Vec<u8> = Vec::new();
    for ctx in &contexts[..contexts.len().saturating_sub(1)] {
        let stream = prg(&ctx.shared_secret, BETA_SIZE + PER_HOP_ROUTING_BYTES);
        let mut padded = filler.clone();
        padded.extend(std::iter::repeat(0u8).take(PER_HOP_ROUTING_BYTES));
        let offset = stream.len() - padded.len();
        filler = xor(&padded, &stream[offset..]);
    }
    filler
}

/// Shifts `slot` onto the front of `previous_beta`, dropping its last
/// [`PER_HOP_ROUTING_BYTES`] and XOR-ing the result with this hop's PRG
/// stream. The dropped bytes are exactly what the filler string (or, for
/// the deepest hop, the direct overwrite below) accounts for.
fn wrap_beta(
    slot: &RoutingSlot,
    previous_beta: &[u8; BETA_SIZE],
    shared_secret: &SharedSecret,
) -> [u8; BETA_SIZE] {
    let stream = prg(shared_secret, BETA_SIZE + PER_HOP_ROUTING_BYTES);
    let mut plain = Vec::with_capacity(BETA_SIZE);
    plain.extend_from_slice(&slot.encode());
    plain.extend_from_slice(&previous_beta[..BETA_SIZE - PER_HOP_ROUTING_BYTES]);
    let wrapped = xor(&plain, &stream[..BETA_SIZE]);
    let mut out = [0u8; BETA_SIZE];
    out.copy_from_slice(&wrapped);
    out
}

/// Folds the path's routing header from the last hop back to the first
/// (§4.2 step 1's beta construction). `beta` starts all-zero; the very
/// first fold (the final hop) overwrites its own tail with the
/// pre-computed filler so every later fold's dropped bytes reproduce
/// exactly what that hop's own PRG tail would otherwise have left behind.
pub(crate) fn construct_header(contexts: &[HopContext]) -> Result<Header, Classified> {
    let r = contexts.len();
    let filler = generate_filler(contexts);

    let mut beta = [0u8; BETA_SIZE];
    let mut header_mac = [0u8; HEADER_MAC_SIZE];

    for k in (0..r).rev() {
        let ctx = &contexts[k];
        let is_terminal = k + 1 == r;

        let slot = if is_terminal {
            RoutingSlot {
                next_hop: *ctx.address.as_bytes(),
                mac: [0u8; PER_HOP_MAC_SIZE],
            }
        } else {
            let mut slot_mac = [0u8; PER_HOP_MAC_SIZE];
            slot_mac[..HEADER_MAC_SIZE].copy_from_slice(&header_mac);
            RoutingSlot {
                next_hop: *contexts[k + 1].address.as_bytes(),
                mac: slot_mac,
            }
        };

        beta = wrap_beta(&slot, &beta, &ctx.shared_secret);

        if is_terminal && !filler.is_empty() {
            let start = BETA_SIZE - filler.len();
            beta[start..].copy_from_slice(&filler);
        }

        header_mac = mac(&ctx.shared_secret, &header_mac_preimage(&ctx.alpha, &beta));
    }

    Ok(Header {
        alpha: contexts[0].alpha.to_bytes(),
        beta,
        mac: header_mac,
    })
}

/// Onion-encrypts `message` under every hop's shared secret in turn. XOR
/// commutes, so the order hops are folded in here only needs to match the
/// order each hop removes its own layer on the way to the destination.
pub(crate) fn layer_message(contexts: &[HopContext], message: Message) -> Message {
    let mut bytes = message.0;
    for ctx in contexts {
        bytes = {
            let layered = stream_cipher(&ctx.shared_secret, &bytes);
            let mut out = [0u8; MESSAGE_SIZE];
            out.copy_from_slice(&layered);
            out
        };
    }
    Message(bytes)
}

/// Combines an already-built header and onion-layered message with the
/// first-hop transaction and challenge bodies into a complete frame. Split
/// out of [`build_packet`] so the pipeline driver, which needs the header's
/// MAC before it can encrypt the first-hop transaction (§4.6), never has to
/// derive the path's shared secrets and fold beta a second time to get it.
pub(crate) fn assemble_packet(
    header: Header,
    message: Message,
    transaction: Transaction,
    challenge: Challenge,
) -> hopr_p2p::Packet {
    hopr_p2p::Packet {
        header,
        transaction,
        challenge,
        message,
    }
}

/// Builds a complete outgoing packet (§4.2 steps 1-6): the routing header,
/// the onion-layered message, and the caller-supplied first-hop
/// transaction and challenge (produced by [`hopr_channel`]'s transfer and
/// challenge-creation operations, which this module does not duplicate).
pub fn build_packet(
    path: &[Hop],
    ephemeral: &SecretKey,
    message: Message,
    first_transaction: Transaction,
    first_challenge: Challenge,
) -> Result<hopr_p2p::Packet, Classified> {
    if path.is_empty() || path.len() > hopr_p2p::packet::sizes::MAX_HOPS {
        return Err(Classified::Fatal(FatalError::PacketSizeMismatch));
    }

    let contexts = derive_path_contexts(path, ephemeral)?;
    let header = construct_header(&contexts)?;
    let message = layer_message(&contexts, message);

    Ok(assemble_packet(header, message, first_transaction, first_challenge))
}

/// The result of peeling one layer off a received header (§4.2 steps 1-8).
pub enum PeelOutcome {
    /// This node is an intermediate hop: forward `next_header` to `next_hop`.
    Forward {
        shared_secret: SharedSecret,
        tag: [u8; TAG_SIZE],
        next_hop: Address,
        next_header: Header,
    },
    /// This node's own address was the routing slot's `next_hop`: it is the
    /// destination, not a relay (§4.2 step 8's termination test).
    Terminate {
        shared_secret: SharedSecret,
        tag: [u8; TAG_SIZE],
    },
}

/// Verifies and peels one layer of a header. A MAC mismatch or a malformed
/// routing slot drops the packet silently — never distinguishing the two
/// in what's returned, since either is adversarial input (§7's `DropReason`
/// rule that a drop must never reveal which check failed).
pub fn transform_header(
    header: &Header,
    own_priv_key: &SecretKey,
    own_address: Address,
) -> Result<PeelOutcome, Classified> {
    let alpha = GroupElement::from_bytes(&header.alpha)
        .map_err(|_| Classified::Drop(DropReason::MacMismatch))?;
    let shared_secret =
        derive_secret(&alpha, own_priv_key).map_err(|_| Classified::Drop(DropReason::MacMismatch))?;

    let preimage = header_mac_preimage(&alpha, &header.beta);
    if !verify_mac(&shared_secret, &preimage, &header.mac) {
        return Err(Classified::Drop(DropReason::MacMismatch));
    }

    let tag = derive_tag_parameters(&shared_secret);

    let mut extended = Vec::with_capacity(BETA_SIZE + PER_HOP_ROUTING_BYTES);
    extended.extend_from_slice(&header.beta);
    extended.extend(std::iter::repeat(0u8).take(PER_HOP_ROUTING_BYTES));
    let stream = prg(&shared_secret, BETA_SIZE + PER_HOP_ROUTING_BYTES);
    let decrypted = xor(&extended, &stream);

    let slot = RoutingSlot::decode(&decrypted[..PER_HOP_ROUTING_BYTES])
        .map_err(|_| Classified::Drop(DropReason::MacMismatch))?;

    let next_hop = Address::from_bytes(slot.next_hop);
    if next_hop == own_address {
        return Ok(PeelOutcome::Terminate { shared_secret, tag });
    }

    let mut next_beta = [0u8; BETA_SIZE];
    next_beta.copy_from_slice(&decrypted[PER_HOP_ROUTING_BYTES..]);
    let next_alpha =
        blind(&alpha, &shared_secret).map_err(|_| Classified::Drop(DropReason::MacMismatch))?;
    let mut next_header_mac = [0u8; HEADER_MAC_SIZE];
    next_header_mac.copy_from_slice(&slot.mac[..HEADER_MAC_SIZE]);

    Ok(PeelOutcome::Forward {
        shared_secret,
        tag,
        next_hop,
        next_header: Header {
            alpha: next_alpha.to_bytes(),
            beta: next_beta,
            mac: next_header_mac,
        },
    })
}

/// Removes this hop's onion layer from the message field. The destination
/// calls this exactly once more than any relay, since its own shared
/// secret is also folded into [`layer_message`] at construction time.
pub fn peel_message_layer(shared_secret: &SharedSecret, message: &Message) -> Message {
    let bytes = stream_cipher(shared_secret, &message.0);
    let mut out = [0u8; MESSAGE_SIZE];
    out.copy_from_slice(&bytes);
    Message(out)
}
