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

//! The top-level driver that binds the onion transform (§4.2) to the
//! payment-channel module (§4.5, §4.6). This is the one place in the crate
//! that decides drop, forward, or deliver (Design Notes: "the packet
//! pipeline is a pure function over an immutable input producing an
//! effect-description").
//!
//! The previous hop's identity is not recoverable from the packet itself —
//! that is the entire point of the onion construction — so it is supplied
//! by the transport-layer caller, which is the only party that actually
//! knows which connection a frame arrived on.

use std::sync::Arc;

use hopr_channel::ticket::Challenge;
use hopr_channel::store::KvStore;
use hopr_channel::transaction::SignedTransaction;
use hopr_channel::{ChainBackend, ChannelManager};
use hopr_crypto::{
    derive_hashed_key, derive_relay_transaction_key, derive_transaction_key, stream_cipher,
    GroupElement,
};
use hopr_p2p::addr::{Address, ChannelId, PeerId};
use hopr_p2p::packet::{sizes::TRANSACTION_SIZE, Message, Packet, Transaction};
use secp256k1::SecretKey;

use crate::error::{Classified, DropReason, FatalError};
use crate::onion::{self, Hop, PeelOutcome};
use crate::replay::ReplayGuard;

/// The pipeline driver's decision for a packet that was not dropped: either
/// it has reached its destination, or it must be handed to the transport
/// layer to forward to `next_hop`.
pub enum Effect {
    /// `next_hop` is this node's routing identity for the next relay;
    /// `next_hop_address` is its on-chain address, for callers that log or
    /// meter by account rather than routing key.
    Forward {
        next_hop: PeerId,
        next_hop_address: Address,
        packet: Packet,
    },
    Deliver { message: Message },
}

fn encrypt_transaction(key: &hopr_crypto::SharedSecret, tx: &Transaction) -> Transaction {
    let ciphertext = stream_cipher(key, &tx.encode());
    let mut raw = [0u8; TRANSACTION_SIZE];
    raw.copy_from_slice(&ciphertext);
    Transaction::from_raw_bytes(&raw)
}

fn decrypt_transaction(
    key: &hopr_crypto::SharedSecret,
    tx: &Transaction,
) -> Result<Transaction, Classified> {
    let plaintext = stream_cipher(key, &tx.encode());
    Transaction::decode(&plaintext).map_err(|_| Classified::Drop(DropReason::MalformedLength))
}

/// A 32-byte hashed key-half, lifted onto secp256k1 as `G · scalar` so that
/// every hop's contribution can later be combined by EC point addition
/// (the resolved Open Question: point addition, not XOR, per SPEC_FULL.md
/// §9) rather than only ever being usable where it was first computed.
fn key_half_point(hashed_key_half: &[u8; 32]) -> Result<[u8; 33], Classified> {
    let scalar = SecretKey::from_slice(hashed_key_half)
        .map_err(|_| Classified::Drop(DropReason::InvalidChallengeSigner))?;
    Ok(GroupElement::from_secret(&scalar).to_bytes())
}

/// Binds the onion transform to one node's payment-channel state. Owns no
/// network connection of its own: transport delivery, retry, and framing
/// are named external collaborators (§1).
pub struct PipelineDriver<C: ChainBackend, K: KvStore, R: ReplayGuard> {
    channels: Arc<ChannelManager<C, K>>,
    replay: Arc<R>,
    onion_key: SecretKey,
}

impl<C: ChainBackend, K: KvStore, R: ReplayGuard> PipelineDriver<C, K, R> {
    pub fn new(channels: Arc<ChannelManager<C, K>>, replay: Arc<R>, onion_key: SecretKey) -> Self {
        PipelineDriver {
            channels,
            replay,
            onion_key,
        }
    }

    pub fn channels(&self) -> &Arc<ChannelManager<C, K>> {
        &self.channels
    }

    async fn check_replay(&self, tag: [u8; 16]) -> Result<(), Classified> {
        let fresh = self
            .replay
            .seen_or_insert(tag)
            .await
            .map_err(Classified::from)?;
        if fresh {
            Ok(())
        } else {
            Err(Classified::Drop(DropReason::ReplayHit))
        }
    }

    /// Construction at the source (§4.2 steps 1-6): builds the routing
    /// header, onion-layers the message, pays the first hop
    /// `path.len() · relay_fee` (enough for every hop, including the
    /// destination, to keep one share), and binds the first challenge to
    /// that hop's own shared secret.
    pub async fn construct(
        &self,
        path: &[Hop],
        ephemeral: &SecretKey,
        message: Message,
    ) -> Result<Packet, Classified> {
        if path.is_empty() || path.len() > hopr_p2p::packet::sizes::MAX_HOPS {
            return Err(Classified::Fatal(FatalError::PacketSizeMismatch));
        }

        let contexts = onion::derive_path_contexts(path, ephemeral)?;
        let header = onion::construct_header(&contexts)?;
        let layered_message = onion::layer_message(&contexts, message);

        // Every hop along the path, including the destination, is owed one
        // relay fee: an intermediate hop keeps its share and forwards the
        // rest, while the destination's share is its reward for delivery.
        let relay_fee = self.channels.config().relay_fee;
        let total_fee = relay_fee * path.len() as u64;

        let first_hop = path[0];
        let first_channel_id = ChannelId::new(self.channels.self_address(), first_hop.address);
        let signed_tx = self
            .channels
            .transfer(first_channel_id, first_hop.peer_id, total_fee)
            .await?;

        let transaction_key = derive_transaction_key(&contexts[0].shared_secret);
        let challenge = self.channels.create_challenge(&transaction_key)?;

        let forward_key = derive_relay_transaction_key(&header.mac);
        let wire_tx = encrypt_transaction(&forward_key, &signed_tx.transaction);

        Ok(onion::assemble_packet(
            header,
            layered_message,
            wire_tx,
            challenge.to_wire(),
        ))
    }

    /// The one-pass transform at a hop (§4.2 steps 1-8, §4.6 steps 1-5):
    /// verifies the header MAC, checks for replay, absorbs the embedded
    /// transaction against the `(previous_hop, self)` channel, verifies
    /// the challenge, peels one message layer, and — for a non-terminal
    /// hop — re-signs the challenge, builds the outgoing transaction, and
    /// re-encrypts it for the next hop.
    pub async fn transform(
        &self,
        packet: Packet,
        previous_hop: PeerId,
    ) -> Result<Effect, Classified> {
        let self_address = self.channels.self_address();
        let outcome = onion::transform_header(&packet.header, &self.onion_key, self_address)?;

        match outcome {
            PeelOutcome::Terminate { shared_secret, tag } => {
                self.check_replay(tag).await?;

                let channel_id = ChannelId::new(self_address, previous_hop.to_address());
                let incoming_key = derive_relay_transaction_key(&packet.header.mac);
                let decoded_tx = decrypt_transaction(&incoming_key, &packet.transaction)?;
                self.channels
                    .absorb_transaction(channel_id, SignedTransaction { transaction: decoded_tx })
                    .await?;

                self.verify_challenge(&packet, &shared_secret, previous_hop)?;

                let hashed_key_half = derive_hashed_key(&shared_secret);
                let point = key_half_point(&hashed_key_half)?;
                self.channels.register_key_half(channel_id, &point).await?;

                let message = onion::peel_message_layer(&shared_secret, &packet.message);
                Ok(Effect::Deliver { message })
            }
            PeelOutcome::Forward {
                shared_secret,
                tag,
                next_hop,
                next_header,
            } => {
                self.check_replay(tag).await?;

                let channel_id = ChannelId::new(self_address, previous_hop.to_address());
                let incoming_key = derive_relay_transaction_key(&packet.header.mac);
                let decoded_tx = decrypt_transaction(&incoming_key, &packet.transaction)?;
                let received = self
                    .channels
                    .absorb_transaction(channel_id, SignedTransaction { transaction: decoded_tx })
                    .await?;

                let mut challenge = self.verify_challenge(&packet, &shared_secret, previous_hop)?;

                let hashed_key_half = derive_hashed_key(&shared_secret);
                let point = key_half_point(&hashed_key_half)?;
                self.channels.register_key_half(channel_id, &point).await?;
                self.channels
                    .update_challenge(&mut challenge, &hashed_key_half)?;

                let message = onion::peel_message_layer(&shared_secret, &packet.message);

                let relay_fee = self.channels.config().relay_fee;
                let outgoing_amount = received - relay_fee;

                let next_channel_id = ChannelId::new(self_address, next_hop);
                let next_peer = self.channels.counterparty_of(next_channel_id).await?;
                let next_tx = self
                    .channels
                    .transfer(next_channel_id, next_peer, outgoing_amount)
                    .await?;

                let forward_key = derive_relay_transaction_key(&next_header.mac);
                let wire_tx = encrypt_transaction(&forward_key, &next_tx.transaction);

                let next_packet = onion::assemble_packet(
                    next_header,
                    message,
                    wire_tx,
                    challenge.to_wire(),
                );

                Ok(Effect::Forward {
                    next_hop: next_peer,
                    next_hop_address: next_hop,
                    packet: next_packet,
                })
            }
        }
    }

    /// §4.2 step 5 / §4.3: the challenge on entry must have been signed by
    /// `previous_hop` over this hop's own transaction key. A mismatch is
    /// adversarial input, never distinguished in the returned error from
    /// any other silent drop.
    fn verify_challenge(
        &self,
        packet: &Packet,
        shared_secret: &hopr_crypto::SharedSecret,
        previous_hop: PeerId,
    ) -> Result<Challenge, Classified> {
        let transaction_key = derive_transaction_key(shared_secret);
        let challenge = Challenge::from_wire(&packet.challenge);
        let recovered = challenge
            .get_counterparty(&transaction_key)
            .map_err(|_| Classified::Drop(DropReason::InvalidChallengeSigner))?;
        if recovered != previous_hop {
            return Err(Classified::Drop(DropReason::InvalidChallengeSigner));
        }
        Ok(challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopr_channel::backend::ChannelOnChainState;
    use hopr_channel::testing::{MockChainBackend, MockKvStore, MockSettlementTransport};
    use hopr_channel::ChannelConfig;
    use hopr_p2p::packet::sizes::{MESSAGE_SIZE, MAX_HOPS};
    use secp256k1::{PublicKey, SECP256K1};

    fn secret(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn hop_from(byte: u8) -> (SecretKey, Hop) {
        let sk = secret(byte);
        let pk = PublicKey::from_secret_key(SECP256K1, &sk);
        let peer_id = PeerId::from_public_key(pk);
        let address = peer_id.to_address();
        (sk, Hop { peer_id, address })
    }

    async fn driver_for(
        chain: Arc<MockChainBackend>,
        priv_key: SecretKey,
        self_address: Address,
    ) -> PipelineDriver<MockChainBackend, MockKvStore, crate::replay::InMemoryReplayGuard> {
        let store = Arc::new(MockKvStore::new());
        let replay = Arc::new(crate::replay::InMemoryReplayGuard::new());
        let transport = Arc::new(MockSettlementTransport::new());
        let manager = Arc::new(ChannelManager::new(
            chain,
            store,
            transport,
            ChannelConfig {
                relay_fee: 1,
                win_prob_numerator: 1,
                win_prob_denominator: 1,
                settlement_timeout: std::time::Duration::from_secs(40),
            },
            self_address,
            priv_key,
        ));
        PipelineDriver::new(manager, replay, priv_key)
    }

    /// Seeds an Open-status channel on the shared mock chain, so every
    /// node's `open_or_fund` below adopts the same on-chain fact.
    async fn seed_open_channel(
        chain: &MockChainBackend,
        a: Address,
        b: Address,
        party_a_balance: u64,
        deposit: u64,
    ) {
        let channel_id = ChannelId::new(a, b);
        chain
            .seed_channel(
                channel_id,
                ChannelOnChainState {
                    deposit,
                    party_a_balance,
                    closure_time: None,
                    state_counter: 2, // Open
                },
            )
            .await;
    }

    #[tokio::test]
    async fn three_hop_relay_forwards_the_remaining_fee_at_every_hop() {
        let (sk_s, hop_s) = hop_from(0x90);
        let (sk_a, hop_a) = hop_from(0x01);
        let (sk_b, hop_b) = hop_from(0x02);
        let (sk_c, hop_c) = hop_from(0x03);
        let ephemeral = secret(0xf0);

        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, hop_s.address, hop_a.address, 500, 1000).await;
        seed_open_channel(&chain, hop_a.address, hop_b.address, 500, 1000).await;
        seed_open_channel(&chain, hop_b.address, hop_c.address, 500, 1000).await;

        let driver_sender = driver_for(chain.clone(), sk_s, hop_s.address).await;
        let driver_a = driver_for(chain.clone(), sk_a, hop_a.address).await;
        let driver_b = driver_for(chain.clone(), sk_b, hop_b.address).await;
        let driver_c = driver_for(chain.clone(), sk_c, hop_c.address).await;

        // Every node adopts the on-chain channel it needs from the shared
        // chain before any packet moves, exactly as a real node does on
        // startup (§4.5's `openOrFund`).
        driver_sender.channels().open_or_fund(hop_a.peer_id, hop_a.address, 0).await.unwrap();
        driver_a.channels().open_or_fund(hop_s.peer_id, hop_s.address, 0).await.unwrap();
        driver_a.channels().open_or_fund(hop_b.peer_id, hop_b.address, 0).await.unwrap();
        driver_b.channels().open_or_fund(hop_a.peer_id, hop_a.address, 0).await.unwrap();
        driver_b.channels().open_or_fund(hop_c.peer_id, hop_c.address, 0).await.unwrap();
        driver_c.channels().open_or_fund(hop_b.peer_id, hop_b.address, 0).await.unwrap();

        let message = Message([0x77; MESSAGE_SIZE]);
        let path = vec![hop_a, hop_b, hop_c];
        assert!(path.len() <= MAX_HOPS);

        let packet = driver_sender
            .construct(&path, &ephemeral, message.clone())
            .await
            .unwrap();

        let effect_a = driver_a.transform(packet, hop_s.peer_id).await.unwrap();
        let (packet_b, next_peer_a) = match effect_a {
            Effect::Forward { packet, next_hop, .. } => (packet, next_hop),
            Effect::Deliver { .. } => panic!("hop A must forward"),
        };
        assert_eq!(next_peer_a.to_address(), hop_b.address);

        let effect_b = driver_b.transform(packet_b, hop_a.peer_id).await.unwrap();
        let packet_c = match effect_b {
            Effect::Forward { packet, .. } => packet,
            Effect::Deliver { .. } => panic!("hop B must forward"),
        };

        let effect_c = driver_c.transform(packet_c, hop_b.peer_id).await.unwrap();
        match effect_c {
            Effect::Deliver { message: delivered } => assert_eq!(delivered.0, message.0),
            Effect::Forward { .. } => panic!("hop C is the destination"),
        }
    }

    #[tokio::test]
    async fn replayed_packet_is_dropped_on_second_delivery() {
        let (sk_a, hop_a) = hop_from(0x21);
        let ephemeral = secret(0xa0);
        let (sk_s, hop_s) = hop_from(0xbb);

        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, hop_a.address, hop_s.address, 500, 1000).await;

        let driver_sender = driver_for(chain.clone(), sk_s, hop_s.address).await;
        let driver_a = driver_for(chain.clone(), sk_a, hop_a.address).await;

        let sender_peer = hop_s.peer_id;
        driver_sender.channels().open_or_fund(hop_a.peer_id, hop_a.address, 0).await.unwrap();
        driver_a.channels().open_or_fund(sender_peer, hop_s.address, 0).await.unwrap();

        let message = Message([0x01; MESSAGE_SIZE]);
        let packet = driver_sender
            .construct(&[hop_a], &ephemeral, message.clone())
            .await
            .unwrap();

        let first = driver_a.transform(packet.clone(), sender_peer).await;
        assert!(matches!(first, Ok(Effect::Deliver { .. })));

        let second = driver_a.transform(packet, sender_peer).await;
        assert!(matches!(
            second,
            Err(Classified::Drop(DropReason::ReplayHit))
        ));
    }

    #[tokio::test]
    async fn tampered_header_is_dropped_as_mac_mismatch() {
        let (sk_a, hop_a) = hop_from(0x31);
        let ephemeral = secret(0xa1);
        let (sk_s, hop_s) = hop_from(0xcc);

        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, hop_a.address, hop_s.address, 500, 1000).await;

        let driver_sender = driver_for(chain.clone(), sk_s, hop_s.address).await;
        let driver_a = driver_for(chain.clone(), sk_a, hop_a.address).await;

        let sender_peer = hop_s.peer_id;
        driver_sender.channels().open_or_fund(hop_a.peer_id, hop_a.address, 0).await.unwrap();
        driver_a.channels().open_or_fund(sender_peer, hop_s.address, 0).await.unwrap();

        let mut packet = driver_sender
            .construct(&[hop_a], &ephemeral, Message([0x02; MESSAGE_SIZE]))
            .await
            .unwrap();
        packet.header.beta[0] ^= 0xff;

        let outcome = driver_a.transform(packet, sender_peer).await;
        assert!(matches!(
            outcome,
            Err(Classified::Drop(DropReason::MacMismatch))
        ));
    }
}
