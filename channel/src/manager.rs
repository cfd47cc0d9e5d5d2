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

//! `ChannelManager`: the arena that owns every channel this node knows
//! about, and every operation in §4.5.
//!
//! Channels are referenced by [`ChannelId`] handle, never by back-pointer
//! (Design Notes' cyclic-reference fix): the manager owns a map from id to
//! an `Arc<Mutex<ChannelRecord>>`, so a caller holding a channel's lock
//! never also needs to hold the manager's own map lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use hopr_crypto::hash;
use hopr_p2p::addr::{Address, ChannelId, PeerId};
use hopr_p2p::settle::SettleChannel;
use secp256k1::{PublicKey, SecretKey};
use tokio::sync::{Mutex, RwLock};

use crate::backend::{ChainBackend, ChainEvent, SettlementTransport};
use crate::config::ChannelConfig;
use crate::error::Error;
use crate::state::{ChannelRecord, ChannelStatus};
use crate::store::{self, KvStore};
use crate::ticket::{Challenge, Ticket};
use crate::transaction::{embedded_money, SignedTransaction};

pub struct ChannelManager<C: ChainBackend, K: KvStore> {
    chain: Arc<C>,
    store: Arc<K>,
    transport: Arc<dyn SettlementTransport>,
    config: ChannelConfig,
    self_address: Address,
    signing_key: SecretKey,
    channels: RwLock<BTreeMap<ChannelId, Arc<Mutex<ChannelRecord>>>>,
}

impl<C: ChainBackend, K: KvStore> ChannelManager<C, K> {
    pub fn new(
        chain: Arc<C>,
        store: Arc<K>,
        transport: Arc<dyn SettlementTransport>,
        config: ChannelConfig,
        self_address: Address,
        signing_key: SecretKey,
    ) -> Self {
        ChannelManager {
            chain,
            store,
            transport,
            config,
            self_address,
            signing_key,
            channels: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn self_address(&self) -> Address {
        self.self_address
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    async fn channel_arc(&self, channel_id: ChannelId) -> Result<Arc<Mutex<ChannelRecord>>, Error> {
        self.channels
            .read()
            .await
            .get(&channel_id)
            .cloned()
            .ok_or(Error::NoSuchChannel(channel_id))
    }

    async fn prune_channel(&self, channel_id: ChannelId) {
        self.channels.write().await.remove(&channel_id);
        for key in [
            store::keys::key(channel_id.as_bytes()),
            store::keys::tx(channel_id.as_bytes()),
            store::keys::restore_tx(channel_id.as_bytes()),
            store::keys::stashed_restore_tx(channel_id.as_bytes()),
            store::keys::index(channel_id.as_bytes()),
            store::keys::current_value(channel_id.as_bytes()),
            store::keys::on_chain_balance(channel_id.as_bytes()),
            store::keys::initial_balance(channel_id.as_bytes()),
            store::keys::total_balance(channel_id.as_bytes()),
        ] {
            let _ = self.store.del(&key).await;
        }
    }

    fn on_chain_status(state_counter: u64) -> ChannelStatus {
        ChannelStatus::from_state_counter(state_counter).unwrap_or(ChannelStatus::Uninitialised)
    }

    /// `openOrFund(counterparty, balance)` (§4.5).
    pub async fn open_or_fund(
        &self,
        counterparty: PeerId,
        counterparty_address: Address,
        balance: u64,
    ) -> Result<ChannelId, Error> {
        let channel_id = ChannelId::new(self.self_address, counterparty_address);
        let on_chain_state = self.chain.get_channel(channel_id).await?;
        let on_chain_status = Self::on_chain_status(on_chain_state.state_counter);
        let has_on_chain = on_chain_status != ChannelStatus::Uninitialised;
        let local_exists = self.channels.read().await.contains_key(&channel_id);

        if has_on_chain && local_exists {
            return Ok(channel_id);
        }

        if !has_on_chain && !local_exists {
            self.chain
                .open_channel(counterparty_address, balance)
                .await?;
            let mut record = ChannelRecord::new(
                channel_id,
                counterparty,
                self.self_address,
                counterparty_address,
            );
            record.set_status(ChannelStatus::Funding);
            let party_a_balance = if record.is_party_a() { balance } else { 0 };
            record.set_balances(balance, party_a_balance);
            self.channels
                .write()
                .await
                .insert(channel_id, Arc::new(Mutex::new(record)));
            return Ok(channel_id);
        }

        if !has_on_chain && local_exists {
            // On-chain is authoritative: our presumed-funded record never
            // actually landed, so prune it.
            self.prune_channel(channel_id).await;
            return Err(Error::NoSuchChannel(channel_id));
        }

        // has_on_chain && !local_exists: adopt the on-chain state as ours.
        let mut record = ChannelRecord::new(
            channel_id,
            counterparty,
            self.self_address,
            counterparty_address,
        );
        record.set_status(on_chain_status);
        record.set_balances(on_chain_state.deposit, on_chain_state.party_a_balance);
        record.set_closure_time(on_chain_state.closure_time);
        self.channels
            .write()
            .await
            .insert(channel_id, Arc::new(Mutex::new(record)));
        Ok(channel_id)
    }

    /// `isOpen(counterparty)` (§4.5).
    pub async fn is_open(&self, channel_id: ChannelId) -> Result<bool, Error> {
        let on_chain_state = self.chain.get_channel(channel_id).await?;
        let on_chain_status = Self::on_chain_status(on_chain_state.state_counter);
        let local_exists = self.channels.read().await.contains_key(&channel_id);

        if on_chain_status == ChannelStatus::Uninitialised && local_exists {
            self.prune_channel(channel_id).await;
            return Ok(false);
        }
        if on_chain_status != ChannelStatus::Uninitialised && !local_exists {
            return Err(Error::StateDivergence);
        }

        Ok(local_exists
            && matches!(
                on_chain_status,
                ChannelStatus::Open | ChannelStatus::PendingClosure
            ))
    }

    /// `transfer(amount, toPeer) -> Transaction` (§4.5). Signs but does not
    /// persist — persistence happens only at `testAndSetNonce` /
    /// acknowledgement time.
    pub async fn transfer(
        &self,
        channel_id: ChannelId,
        to_peer: PeerId,
        amount: u64,
    ) -> Result<SignedTransaction, Error> {
        let arc = self.channel_arc(channel_id).await?;
        let mut record = arc.lock().await;

        if record.counterparty() != to_peer {
            return Err(Error::NoSuchChannel(channel_id));
        }

        let new_party_a_balance = if record.is_party_a() {
            record
                .party_a_balance()
                .checked_sub(amount)
                .ok_or(Error::InsufficientBalance {
                    attempted: amount,
                    available: record.party_a_balance(),
                })?
        } else {
            // PartyB's share is the channel balance not already credited to
            // partyA; a transfer from B must not exceed it (§3's
            // `0 ≤ partyABalance ≤ balance` invariant).
            let party_b_balance = record.balance() - record.party_a_balance();
            party_b_balance
                .checked_sub(amount)
                .ok_or(Error::InsufficientBalance {
                    attempted: amount,
                    available: party_b_balance,
                })?;
            record.party_a_balance() + amount
        };

        let next_index = record.index() + 1;
        let signed = SignedTransaction::sign(
            *channel_id.as_bytes(),
            next_index,
            new_party_a_balance,
            &self.signing_key,
        )
        .map_err(Error::from)?;

        // Not yet persisted here (persistence happens at the recipient's
        // `testAndSetNonce`, or on this side once an absorbed transaction
        // catches up to `next_index`), so until then the counterparty is
        // the only side holding proof of it.
        record.record_pending_outgoing(next_index);
        Ok(signed)
    }

    /// `testAndSetNonce(signature)` (§4.5): the sole defense against a
    /// counterparty replaying the same signed update twice.
    pub async fn test_and_set_nonce(
        &self,
        channel_id: ChannelId,
        signature: &[u8; 64],
    ) -> Result<(), Error> {
        let arc = self.channel_arc(channel_id).await?;
        let mut record = arc.lock().await;

        let mut preimage = Vec::with_capacity(64);
        preimage.extend_from_slice(channel_id.as_bytes());
        preimage.extend_from_slice(&hash(signature));
        let key = hash(&preimage);

        if record.test_and_set_nonce(key) {
            Ok(())
        } else {
            Err(Error::NonceReuse)
        }
    }

    /// Steps 1-4 of §4.6's packet–channel binding: validates and absorbs
    /// an embedded transaction, returning the amount received by this hop.
    pub async fn absorb_transaction(
        &self,
        channel_id: ChannelId,
        tx: SignedTransaction,
    ) -> Result<u64, Error> {
        let arc = self.channel_arc(channel_id).await?;
        let mut record = arc.lock().await;

        if !matches!(
            record.status(),
            ChannelStatus::Open | ChannelStatus::PendingClosure
        ) {
            return Err(Error::WrongStatus {
                found: record.status(),
                expected: "Open or PendingClosure",
            });
        }

        let signer = tx.verify_and_recover()?;
        if signer != record.counterparty() {
            return Err(Error::InvalidSignature);
        }

        if tx.transaction.index != record.index() + 1 {
            return Err(Error::IndexRegression {
                current: record.index(),
                given: tx.transaction.index,
            });
        }

        let counterparty_is_party_a = !record.is_party_a();
        let received = embedded_money(
            record.party_a_balance(),
            tx.transaction.value,
            counterparty_is_party_a,
        );
        if received < self.config.relay_fee as i64 {
            return Err(Error::InsufficientFee {
                amount: received.max(0) as u64,
            });
        }

        record.accept_transaction(tx);
        Ok(received as u64)
    }

    /// Exposes a channel's counterparty identity, e.g. for the pipeline
    /// driver resolving a routing address it just peeled from beta to the
    /// `PeerId` its own (self, nextHop) channel record already knows
    /// (§4.6 step 8's next-hop transaction target).
    pub async fn counterparty_of(&self, channel_id: ChannelId) -> Result<PeerId, Error> {
        let arc = self.channel_arc(channel_id).await?;
        let record = arc.lock().await;
        Ok(record.counterparty())
    }

    /// `createChallenge(transactionKey, signer)` (§4.3), signed under this
    /// node's own on-chain key so the next hop can recover our identity
    /// from it.
    pub fn create_challenge(&self, transaction_key: &[u8; 32]) -> Result<Challenge, Error> {
        Challenge::create(transaction_key, &self.signing_key)
    }

    /// `updateChallenge(hashedKeyHalf, signer)` (§4.3): rebinds `challenge`
    /// to this hop's hashed key-half and re-signs it under this node's key,
    /// in place, before it is forwarded to the next hop.
    pub fn update_challenge(
        &self,
        challenge: &mut Challenge,
        hashed_key_half: &[u8; 32],
    ) -> Result<(), Error> {
        challenge.update(hashed_key_half, &self.signing_key)
    }

    /// Persists the 33-byte EC key-half commitment a hop contributes
    /// toward `getPreviousChallenges`' eventual aggregate.
    pub async fn register_key_half(
        &self,
        channel_id: ChannelId,
        key_half_point: &[u8; 33],
    ) -> Result<(), Error> {
        let key = store::keys::challenge(channel_id.as_bytes(), key_half_point);
        self.store.put(&key, key_half_point).await
    }

    /// `getPreviousChallenges(channelId)` (§4.5): combines every stored
    /// key-half by EC point addition to reconstruct the aggregate
    /// pre-image that unlocks on-chain redemption (resolved Open Question:
    /// point addition, not XOR).
    pub async fn get_previous_challenges(&self, channel_id: ChannelId) -> Result<[u8; 33], Error> {
        let gte = store::keys::challenge(channel_id.as_bytes(), &[0x00; 33]);
        let lte = store::keys::challenge(channel_id.as_bytes(), &[0xff; 33]);
        let entries = self.store.create_read_stream(gte, lte).await?;

        let mut combined: Option<PublicKey> = None;
        for (_, value) in entries {
            let point = PublicKey::from_slice(&value).map_err(|_| Error::InvalidSignature)?;
            combined = Some(match combined {
                None => point,
                Some(acc) => acc.combine(&point).map_err(|_| Error::InvalidSignature)?,
            });
        }
        combined
            .map(|point| point.serialize())
            .ok_or(Error::NothingToSettle)
    }

    /// `submitSettlement(channelId)` (§4.5): tries the latest update, then
    /// the restore transaction, then the stashed restore transaction.
    pub async fn submit_settlement(&self, channel_id: ChannelId) -> Result<(), Error> {
        let arc = self.channel_arc(channel_id).await?;
        let tx = {
            let record = arc.lock().await;
            record
                .latest_transaction()
                .or_else(|| record.restore_transaction())
                .or_else(|| record.stashed_restore_transaction())
                .cloned()
                .ok_or(Error::NothingToSettle)?
        };
        self.chain.close_channel(&tx).await
    }

    /// `closeChannel(channelId)`'s closure protocol (§4.5).
    pub async fn close_channel(&self, channel_id: ChannelId) -> Result<(), Error> {
        let on_chain_state = self.chain.get_channel(channel_id).await?;
        let on_chain_status = Self::on_chain_status(on_chain_state.state_counter);

        match on_chain_status {
            ChannelStatus::Uninitialised => {
                self.prune_channel(channel_id).await;
                return Err(Error::NoSuchChannel(channel_id));
            }
            ChannelStatus::Withdrawable => return self.withdraw(channel_id).await,
            ChannelStatus::Closed => return Ok(()),
            _ => {}
        }

        let (counterparty, counterparty_address, counterparty_may_be_ahead) = {
            let arc = self.channel_arc(channel_id).await?;
            let record = arc.lock().await;
            (
                record.counterparty(),
                record.counterparty_address(),
                record.counterparty_may_be_ahead(),
            )
        };

        let mut events = self.chain.subscribe_channel_events(channel_id).await?;
        self.chain
            .initiate_channel_closure(counterparty_address)
            .await?;
        {
            let arc = self.channel_arc(channel_id).await?;
            let mut record = arc.lock().await;
            record.set_status(ChannelStatus::PendingClosure);
        }

        if counterparty_may_be_ahead {
            // `localIndex > ourLastTx.index` (§4.5): the counterparty may
            // hold a transaction this node signed but never itself
            // persisted, so ask first and only fall back to our own
            // (possibly stale) transaction after SETTLEMENT_TIMEOUT.
            self.transport
                .send_settle_request(counterparty, SettleChannel { channel_id })
                .await?;

            let cooperated = tokio::time::timeout(self.config.settlement_timeout, async {
                while let Some(event) = events.recv().await {
                    if let ChainEvent::ClosedChannel(id) = event {
                        if id == channel_id {
                            return true;
                        }
                    }
                }
                false
            })
            .await
            .unwrap_or(false);

            if !cooperated {
                self.submit_settlement(channel_id).await?;
                while let Some(event) = events.recv().await {
                    if let ChainEvent::ClosedChannel(id) = event {
                        if id == channel_id {
                            break;
                        }
                    }
                }
            }
        } else {
            // We already hold the most recent transaction we know of:
            // submit immediately rather than waiting on a cooperation
            // window nobody needs.
            self.submit_settlement(channel_id).await?;
            while let Some(event) = events.recv().await {
                if let ChainEvent::ClosedChannel(id) = event {
                    if id == channel_id {
                        break;
                    }
                }
            }
        }

        self.withdraw(channel_id).await
    }

    /// `withdraw(channelId)` (§4.5). Per the resolved Open Question, the
    /// settle timestamp is re-derived from a fresh `getChannel` read after
    /// every block-subscription reconnect, rather than trusting a possibly
    /// stale cached value.
    pub async fn withdraw(&self, channel_id: ChannelId) -> Result<(), Error> {
        let counterparty_address = {
            let arc = self.channel_arc(channel_id).await?;
            let record = arc.lock().await;
            record.counterparty_address()
        };

        'reconnect: loop {
            let settle_timestamp = self
                .chain
                .get_channel(channel_id)
                .await?
                .closure_time
                .ok_or(Error::NothingToSettle)?;

            let mut blocks = self.chain.subscribe_new_blocks().await?;
            loop {
                match blocks.recv().await {
                    Some(block_time) if block_time > settle_timestamp => break 'reconnect,
                    Some(_) => continue,
                    None => continue 'reconnect,
                }
            }
        }

        self.chain.withdraw(counterparty_address).await?;
        self.prune_channel(channel_id).await;
        Ok(())
    }

    /// Returns a redeemable ticket's winner status, for callers deciding
    /// whether to submit it on-chain (scenario: "two tickets, one
    /// winning", §8).
    pub fn is_winning_ticket(&self, ticket: &Ticket) -> bool {
        ticket.is_winning()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChannelOnChainState;
    use crate::testing::{MockChainBackend, MockKvStore, MockSettlementTransport};
    use hopr_p2p::addr::PeerId;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};
    use std::time::Duration;

    // Addresses are chosen directly (rather than derived from a peer's
    // public key) so a test controls partyA/partyB assignment without
    // fighting the hash: `addr(1)` is always partyA against `addr(2)`.
    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    fn peer(byte: u8) -> (SecretKey, PeerId) {
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        let pk = PublicKey::from_secret_key(SECP256K1, &sk);
        (sk, PeerId::from_public_key(pk))
    }

    fn config() -> ChannelConfig {
        ChannelConfig {
            relay_fee: 1,
            win_prob_numerator: 1,
            win_prob_denominator: 1,
            settlement_timeout: Duration::from_secs(40),
        }
    }

    fn manager_for(
        chain: Arc<MockChainBackend>,
        signing_key: SecretKey,
        self_address: Address,
    ) -> ChannelManager<MockChainBackend, MockKvStore> {
        manager_with_transport(
            chain,
            signing_key,
            self_address,
            Arc::new(MockSettlementTransport::new()),
        )
    }

    fn manager_with_transport(
        chain: Arc<MockChainBackend>,
        signing_key: SecretKey,
        self_address: Address,
        transport: Arc<MockSettlementTransport>,
    ) -> ChannelManager<MockChainBackend, MockKvStore> {
        ChannelManager::new(
            chain,
            Arc::new(MockKvStore::new()),
            transport,
            config(),
            self_address,
            signing_key,
        )
    }

    async fn seed_open_channel(
        chain: &MockChainBackend,
        a: Address,
        b: Address,
        party_a_balance: u64,
        deposit: u64,
    ) -> ChannelId {
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
        channel_id
    }

    #[tokio::test]
    async fn open_or_fund_is_a_no_op_when_both_sides_already_agree() {
        let (addr_a, addr_b) = (addr(0x01), addr(0x02));
        let (sk_b, peer_b) = peer(0x02);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_b, addr_b);
        let before = manager.open_or_fund(peer_b, addr_a, 0).await.unwrap();
        let after = manager.open_or_fund(peer_b, addr_a, 0).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn open_or_fund_funds_a_fresh_channel_when_neither_side_has_one() {
        let (addr_a, addr_b) = (addr(0x03), addr(0x04));
        let (sk_a, _) = peer(0x03);
        let (_, peer_b) = peer(0x04);
        let chain = Arc::new(MockChainBackend::new());

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = manager.open_or_fund(peer_b, addr_b, 50).await.unwrap();
        // Freshly funded status is `Funding`, not yet `Open`: `transfer`
        // against it still succeeds (balances are tracked locally), even
        // though `absorb_transaction` would reject the same record.
        let result = manager.transfer(channel_id, peer_b, 1).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn open_or_fund_prunes_the_local_record_when_on_chain_has_none() {
        let (addr_a, addr_b) = (addr(0x05), addr(0x06));
        let (sk_a, _) = peer(0x05);
        let (_, peer_b) = peer(0x06);
        let chain = Arc::new(MockChainBackend::new());

        let manager = manager_for(chain.clone(), sk_a, addr_a);
        // First call funds a local-only record (on-chain never actually
        // lands, e.g. the funding transaction silently failed).
        let channel_id = manager.open_or_fund(peer_b, addr_b, 10).await.unwrap();

        // A second open_or_fund call still finds no on-chain channel, so it
        // prunes the stale local record and reports it missing.
        let result = manager.open_or_fund(peer_b, addr_b, 10).await;
        assert!(matches!(result, Err(Error::NoSuchChannel(id)) if id == channel_id));
    }

    #[tokio::test]
    async fn is_open_surfaces_divergent_state_as_fatal() {
        let (addr_a, addr_b) = (addr(0x07), addr(0x08));
        let (sk_a, _) = peer(0x07);
        let chain = Arc::new(MockChainBackend::new());
        let channel_id = seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        // On-chain the channel exists, but this node never recorded it
        // locally: the node cannot safely proceed (§4.5's divergent-state
        // scenario, §8 scenario 5).
        let manager = manager_for(chain, sk_a, addr_a);
        let result = manager.is_open(channel_id).await;
        assert!(matches!(result, Err(Error::StateDivergence)));
    }

    #[tokio::test]
    async fn is_open_silently_prunes_when_on_chain_is_uninitialised() {
        let (addr_a, addr_b) = (addr(0x09), addr(0x0a));
        let (sk_a, _) = peer(0x09);
        let (_, peer_b) = peer(0x0a);
        let chain = Arc::new(MockChainBackend::new());

        let manager = manager_for(chain.clone(), sk_a, addr_a);
        let channel_id = manager.open_or_fund(peer_b, addr_b, 10).await.unwrap();

        // Simulate the funding transaction never landing: on-chain state
        // is still Uninitialised (nothing was seeded), so is_open must
        // prune silently and return false, not error.
        let result = manager.is_open(channel_id).await.unwrap();
        assert!(!result);
        // The local record is now gone: a second transfer attempt fails
        // with NoSuchChannel rather than stale success.
        assert!(matches!(
            manager.transfer(channel_id, peer_b, 1).await,
            Err(Error::NoSuchChannel(_))
        ));
    }

    #[tokio::test]
    async fn transfer_rejects_an_amount_exceeding_the_available_balance() {
        let (addr_a, addr_b) = (addr(0x0b), addr(0x0c));
        let (sk_a, _) = peer(0x0b);
        let (_, peer_b) = peer(0x0c);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        let result = manager.transfer(channel_id, peer_b, 6).await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn transfer_from_party_b_rejects_an_amount_exceeding_its_share() {
        // addr_lo < addr_hi, so addr_lo is partyA; self is addr_hi, partyB,
        // with a zero balance channel (§8 boundary: "channel with balance =
        // 0 must not accept any transfer" also holds for the partyB side).
        let (addr_lo, addr_hi) = (addr(0x0b), addr(0x0c));
        let (_, peer_lo) = peer(0x0b);
        let (sk_hi, _) = peer(0x0c);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_lo, addr_hi, 0, 0).await;

        let manager = manager_for(chain, sk_hi, addr_hi);
        let channel_id = ChannelId::new(addr_lo, addr_hi);
        manager.open_or_fund(peer_lo, addr_lo, 0).await.unwrap();

        let result = manager.transfer(channel_id, peer_lo, 1).await;
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn absorb_transaction_rejects_index_regression() {
        let (addr_a, addr_b) = (addr(0x0d), addr(0x0e));
        let (sk_a, _) = peer(0x0d);
        let (sk_b, peer_b) = peer(0x0e);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        // B pays A 2, so partyA's balance rises from 5 to 7 (index 1).
        let tx = SignedTransaction::sign(*channel_id.as_bytes(), 1, 7, &sk_b).unwrap();
        manager
            .absorb_transaction(channel_id, tx.clone())
            .await
            .unwrap();

        // Re-submitting the same (now stale) index must be rejected.
        let result = manager.absorb_transaction(channel_id, tx).await;
        assert!(matches!(result, Err(Error::IndexRegression { .. })));
    }

    #[tokio::test]
    async fn absorb_transaction_rejects_a_transfer_below_the_relay_fee() {
        let (addr_a, addr_b) = (addr(0x0f), addr(0x10));
        let (sk_a, _) = peer(0x0f);
        let (sk_b, peer_b) = peer(0x10);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        // B pays A nothing (partyA's balance unchanged): below the
        // configured relay fee of 1.
        let tx = SignedTransaction::sign(*channel_id.as_bytes(), 1, 5, &sk_b).unwrap();
        let result = manager.absorb_transaction(channel_id, tx).await;
        assert!(matches!(result, Err(Error::InsufficientFee { .. })));
    }

    #[tokio::test]
    async fn absorb_transaction_accepts_a_valid_transfer_and_advances_the_index() {
        let (addr_a, addr_b) = (addr(0x11), addr(0x12));
        let (sk_a, _) = peer(0x11);
        let (sk_b, peer_b) = peer(0x12);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        let tx = SignedTransaction::sign(*channel_id.as_bytes(), 1, 9, &sk_b).unwrap();
        let received = manager.absorb_transaction(channel_id, tx).await.unwrap();
        assert_eq!(received, 4);
    }

    #[tokio::test]
    async fn test_and_set_nonce_rejects_a_resubmitted_signature() {
        let (addr_a, addr_b) = (addr(0x13), addr(0x14));
        let (sk_a, _) = peer(0x13);
        let (_, peer_b) = peer(0x14);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        let signature = [0x42; 64];
        manager
            .test_and_set_nonce(channel_id, &signature)
            .await
            .unwrap();
        let result = manager.test_and_set_nonce(channel_id, &signature).await;
        assert!(matches!(result, Err(Error::NonceReuse)));
    }

    #[tokio::test]
    async fn get_previous_challenges_combines_key_halves_by_point_addition() {
        let (addr_a, addr_b) = (addr(0x15), addr(0x16));
        let (sk_a, _) = peer(0x15);
        let (_, peer_b) = peer(0x16);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        let (half_one, _) = peer(0x20);
        let (half_two, _) = peer(0x21);
        let point_one = hopr_crypto::GroupElement::from_secret(&half_one).to_bytes();
        let point_two = hopr_crypto::GroupElement::from_secret(&half_two).to_bytes();
        manager
            .register_key_half(channel_id, &point_one)
            .await
            .unwrap();
        manager
            .register_key_half(channel_id, &point_two)
            .await
            .unwrap();

        let combined = manager.get_previous_challenges(channel_id).await.unwrap();
        let expected = PublicKey::from_slice(&point_one)
            .unwrap()
            .combine(&PublicKey::from_slice(&point_two).unwrap())
            .unwrap()
            .serialize();
        assert_eq!(combined, expected);
    }

    #[tokio::test]
    async fn get_previous_challenges_fails_with_nothing_to_settle_when_empty() {
        let (addr_a, addr_b) = (addr(0x17), addr(0x18));
        let (sk_a, _) = peer(0x17);
        let (_, peer_b) = peer(0x18);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        let result = manager.get_previous_challenges(channel_id).await;
        assert!(matches!(result, Err(Error::NothingToSettle)));
    }

    #[tokio::test]
    async fn withdraw_before_closure_time_is_known_reverts() {
        let (addr_a, addr_b) = (addr(0x19), addr(0x1a));
        let (sk_a, _) = peer(0x19);
        let (_, peer_b) = peer(0x1a);
        let chain = Arc::new(MockChainBackend::new());
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let manager = manager_for(chain, sk_a, addr_a);
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        // `initiateChannelClosure` was never called, so no closure
        // deadline exists yet: withdraw must revert (§8 boundary
        // behavior), not silently proceed.
        let result = manager.withdraw(channel_id).await;
        assert!(matches!(result, Err(Error::NothingToSettle)));
    }

    /// §8 scenario 4: A has an unacknowledged outgoing transfer in
    /// flight, so B may already hold proof of it that A itself never
    /// persisted (`counterparty_may_be_ahead`). A asks cooperatively via
    /// `SETTLE_CHANNEL`; B refuses to cooperate, so this node waits out
    /// `SETTLEMENT_TIMEOUT` and submits its own last-known transaction
    /// unilaterally, then withdraws once `closureTime` has elapsed.
    /// `start_paused` plus an explicit `test_block_advance` lets both
    /// waits resolve without any real delay: the runtime auto-advances
    /// its mocked clock to the next pending timer whenever every task is
    /// parked, and the block-wait is driven by hand since it blocks on a
    /// channel, not a timer.
    #[tokio::test(start_paused = true)]
    async fn unilateral_settlement_after_counterparty_refuses_to_cooperate() {
        let (addr_a, addr_b) = (addr(0x1b), addr(0x1c));
        let (sk_a, _) = peer(0x1b);
        let (sk_b, peer_b) = peer(0x1c);
        let chain = Arc::new(MockChainBackend::with_closure_period(Duration::from_secs(10)));
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let transport = Arc::new(MockSettlementTransport::new());
        let manager = Arc::new(manager_with_transport(
            chain.clone(),
            sk_a,
            addr_a,
            transport.clone(),
        ));
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        // B pays A 2, so partyA's balance rises from 5 to 7 — the last
        // agreed split, and A's only proof of it.
        let tx = SignedTransaction::sign(*channel_id.as_bytes(), 1, 7, &sk_b).unwrap();
        manager.absorb_transaction(channel_id, tx).await.unwrap();

        // A then sends B a further transfer of its own; B never
        // acknowledges it, so only B holds proof of index 2.
        manager.transfer(channel_id, peer_b, 1).await.unwrap();

        let closer = manager.clone();
        let handle = tokio::spawn(async move { closer.close_channel(channel_id).await });

        // B never calls back with a ClosedChannel event: let the
        // SETTLEMENT_TIMEOUT (40s, see `config`) elapse so close_channel
        // falls through to an unsolicited submit_settlement.
        tokio::time::sleep(Duration::from_secs(45)).await;

        // Unblock withdraw's block-wait: closure_time was set to +10s by
        // initiate_channel_closure, so any later block satisfies it.
        chain.test_block_advance(Duration::from_secs(20)).await;

        handle.await.unwrap().unwrap();

        // A successful withdraw prunes every local key for this channel.
        assert!(manager.channel_arc(channel_id).await.is_err());
        let on_chain = chain.get_channel(channel_id).await.unwrap();
        assert_eq!(on_chain.party_a_balance, 7);

        // The cooperative ask really was sent over the wire.
        let sent = transport.sent_requests().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.channel_id, channel_id);
    }

    /// When this node holds no unacknowledged outgoing transfer, it is
    /// not behind the counterparty by any evidence it has, so
    /// `close_channel` skips the cooperative ask and submits immediately
    /// instead of waiting on `SETTLEMENT_TIMEOUT`.
    #[tokio::test(start_paused = true)]
    async fn close_channel_submits_immediately_when_not_behind() {
        let (addr_a, addr_b) = (addr(0x1d), addr(0x1e));
        let (sk_a, _) = peer(0x1d);
        let (sk_b, peer_b) = peer(0x1e);
        let chain = Arc::new(MockChainBackend::with_closure_period(Duration::from_secs(10)));
        seed_open_channel(&chain, addr_a, addr_b, 5, 10).await;

        let transport = Arc::new(MockSettlementTransport::new());
        let manager = Arc::new(manager_with_transport(
            chain.clone(),
            sk_a,
            addr_a,
            transport.clone(),
        ));
        let channel_id = ChannelId::new(addr_a, addr_b);
        manager.open_or_fund(peer_b, addr_b, 0).await.unwrap();

        // B pays A 2; A never sends anything of its own afterward, so A's
        // own record is already the most recent either side can show.
        let tx = SignedTransaction::sign(*channel_id.as_bytes(), 1, 7, &sk_b).unwrap();
        manager.absorb_transaction(channel_id, tx).await.unwrap();

        let closer = manager.clone();
        let handle = tokio::spawn(async move { closer.close_channel(channel_id).await });

        // Give close_channel's own submit_settlement a chance to run and
        // reach the block-wait, well under SETTLEMENT_TIMEOUT.
        tokio::time::sleep(Duration::from_secs(1)).await;
        chain.test_block_advance(Duration::from_secs(20)).await;

        handle.await.unwrap().unwrap();

        assert!(manager.channel_arc(channel_id).await.is_err());
        // No cooperative ask was needed.
        assert!(transport.sent_requests().await.is_empty());
    }
}
