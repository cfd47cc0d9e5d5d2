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

//! In-memory test doubles for [`ChainBackend`] and [`KvStore`], in the
//! style of a mocked Lightning backend: enough state to drive every
//! scenario in the testable-properties suite, none of the real RPC
//! plumbing.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use hopr_p2p::addr::{Address, ChannelId, PeerId};
use hopr_p2p::settle::SettleChannel;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex;

use crate::backend::{ChainBackend, ChainEvent, ChannelOnChainState, SettlementTransport};
use crate::error::Error;
use crate::state::ChannelStatus;
use crate::store::{BatchOp, KvStore};
use crate::transaction::SignedTransaction;

struct MockChannel {
    state: ChannelOnChainState,
    subscribers: Vec<Sender<ChainEvent>>,
}

/// An in-memory chain backend a test can drive directly: it has no RPC
/// connection, no contract, and advances its clock only when
/// [`ChainBackend::test_block_advance`] is called.
pub struct MockChainBackend {
    channels: Mutex<BTreeMap<ChannelId, MockChannel>>,
    block_time: Mutex<Duration>,
    block_subscribers: Mutex<Vec<Sender<Duration>>>,
    closure_period: Duration,
}

impl MockChainBackend {
    pub fn new() -> Self {
        Self::with_closure_period(Duration::from_secs(100))
    }

    /// Like [`MockChainBackend::new`], but with a caller-chosen
    /// `closureTime` offset so a test can drive `PendingClosure ->
    /// Withdrawable` on a convenient schedule instead of the default.
    pub fn with_closure_period(closure_period: Duration) -> Self {
        MockChainBackend {
            channels: Mutex::new(BTreeMap::new()),
            block_time: Mutex::new(Duration::from_secs(0)),
            block_subscribers: Mutex::new(Vec::new()),
            closure_period,
        }
    }

    /// Test-only seam to put a channel directly into a given on-chain
    /// state, bypassing `open_channel`.
    pub async fn seed_channel(&self, channel_id: ChannelId, state: ChannelOnChainState) {
        self.channels.lock().await.insert(
            channel_id,
            MockChannel {
                state,
                subscribers: Vec::new(),
            },
        );
    }

    async fn emit(&self, channel_id: ChannelId, event: ChainEvent) {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(&channel_id) {
            channel.subscribers.retain(|tx| !tx.is_closed());
            for tx in &channel.subscribers {
                let _ = tx.send(event).await;
            }
        }
    }
}

impl Default for MockChainBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainBackend for MockChainBackend {
    async fn get_channel(&self, channel_id: ChannelId) -> Result<ChannelOnChainState, Error> {
        Ok(self
            .channels
            .lock()
            .await
            .get(&channel_id)
            .map(|c| c.state)
            .unwrap_or(ChannelOnChainState {
                deposit: 0,
                party_a_balance: 0,
                closure_time: None,
                state_counter: ChannelStatus::Uninitialised as u64,
            }))
    }

    async fn open_channel(&self, _counterparty: Address, _deposit: u64) -> Result<(), Error> {
        Ok(())
    }

    async fn initiate_channel_closure(&self, _counterparty: Address) -> Result<(), Error> {
        // A real contract identifies the channel from `(msg.sender,
        // counterparty)`; this trait's signature (matching §6 verbatim)
        // gives the mock no caller identity to rebuild that pair from, and
        // a test never drives more than one channel per backend at a time,
        // so the unilateral-closure countdown is simply started on every
        // channel this backend currently tracks.
        let now = *self.block_time.lock().await;
        let closure_period = self.closure_period;
        let mut channels = self.channels.lock().await;
        for channel in channels.values_mut() {
            channel.state.closure_time = Some(now + closure_period);
            channel.state.state_counter = ChannelStatus::PendingClosure as u64;
        }
        Ok(())
    }

    async fn claim_channel_closure(&self, _counterparty: Address) -> Result<(), Error> {
        Ok(())
    }

    async fn close_channel(&self, tx: &SignedTransaction) -> Result<(), Error> {
        let channel_id = ChannelId::from_bytes(tx.transaction.channel_id);
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get_mut(&channel_id) {
            channel.state.party_a_balance = tx.transaction.value;
            channel.state.state_counter = ChannelStatus::PendingClosure as u64;
        }
        drop(channels);
        self.emit(channel_id, ChainEvent::ClosedChannel(channel_id))
            .await;
        Ok(())
    }

    async fn withdraw(&self, _counterparty: Address) -> Result<(), Error> {
        Ok(())
    }

    async fn send_transaction(&self, _tx: &SignedTransaction) -> Result<(), Error> {
        Ok(())
    }

    async fn get_block_timestamp(&self) -> Result<Duration, Error> {
        Ok(*self.block_time.lock().await)
    }

    async fn subscribe_channel_events(
        &self,
        channel_id: ChannelId,
    ) -> Result<Receiver<ChainEvent>, Error> {
        let (tx, rx) = mpsc::channel(16);
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel_id)
            .or_insert_with(|| MockChannel {
                state: ChannelOnChainState {
                    deposit: 0,
                    party_a_balance: 0,
                    closure_time: None,
                    state_counter: ChannelStatus::Uninitialised as u64,
                },
                subscribers: Vec::new(),
            })
            .subscribers
            .push(tx);
        Ok(rx)
    }

    async fn subscribe_new_blocks(&self) -> Result<Receiver<Duration>, Error> {
        let (tx, rx) = mpsc::channel(16);
        self.block_subscribers.lock().await.push(tx);
        Ok(rx)
    }

    async fn test_block_advance(&self, by: Duration) {
        let mut block_time = self.block_time.lock().await;
        *block_time += by;
        let now = *block_time;
        drop(block_time);

        let mut subscribers = self.block_subscribers.lock().await;
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            let _ = tx.send(now).await;
        }
    }
}

/// An in-memory kv store backed by a `BTreeMap`, so range scans return
/// entries in key order exactly like the real thing (§6).
pub struct MockKvStore {
    data: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MockKvStore {
    pub fn new() -> Self {
        MockKvStore {
            data: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for MockKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MockKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.data.lock().await.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn del(&self, key: &[u8]) -> Result<(), Error> {
        self.data.lock().await.remove(key);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), Error> {
        let mut data = self.data.lock().await;
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn create_read_stream(
        &self,
        gte: Vec<u8>,
        lte: Vec<u8>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        Ok(self
            .data
            .lock()
            .await
            .range(gte..=lte)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// A `SETTLE_CHANNEL` transport a test can inspect: it never answers, it
/// only records what was sent, modeling a counterparty that receives the
/// cooperative request and either does or doesn't act on it.
pub struct MockSettlementTransport {
    sent: Mutex<Vec<(PeerId, SettleChannel)>>,
}

impl MockSettlementTransport {
    pub fn new() -> Self {
        MockSettlementTransport {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn sent_requests(&self) -> Vec<(PeerId, SettleChannel)> {
        self.sent.lock().await.clone()
    }
}

impl Default for MockSettlementTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettlementTransport for MockSettlementTransport {
    async fn send_settle_request(
        &self,
        counterparty: PeerId,
        request: SettleChannel,
    ) -> Result<(), Error> {
        self.sent.lock().await.push((counterparty, request));
        Ok(())
    }
}
