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

//! The abstract chain backend (§6): Ethereum RPC plumbing, contract
//! deployment, and the live chain itself are all out of scope — this
//! trait is the only seam the rest of the crate ever touches.

use std::time::Duration;

use async_trait::async_trait;
use hopr_p2p::addr::{Address, ChannelId, PeerId};
use hopr_p2p::settle::SettleChannel;
use tokio::sync::mpsc::Receiver;

use crate::error::Error;
use crate::transaction::SignedTransaction;

/// `getChannel`'s return shape: on-chain channel state as of the last
/// confirmed block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ChannelOnChainState {
    pub deposit: u64,
    pub party_a_balance: u64,
    pub closure_time: Option<Duration>,
    pub state_counter: u64,
}

/// Events a channel's owner reacts to in order to drive its local state
/// machine (§4.5's state table).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChainEvent {
    OpenedChannel(ChannelId),
    ClosedChannel(ChannelId),
}

/// Ethereum RPC plumbing, contract deployment/migration tooling, and the
/// live chain connection are named external collaborators (§1); this
/// trait is the abstract seam through which the channel state machine
/// reaches them.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    async fn get_channel(&self, channel_id: ChannelId) -> Result<ChannelOnChainState, Error>;

    async fn open_channel(&self, counterparty: Address, deposit: u64) -> Result<(), Error>;

    async fn initiate_channel_closure(&self, counterparty: Address) -> Result<(), Error>;

    async fn claim_channel_closure(&self, counterparty: Address) -> Result<(), Error>;

    async fn close_channel(&self, tx: &SignedTransaction) -> Result<(), Error>;

    async fn withdraw(&self, counterparty: Address) -> Result<(), Error>;

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<(), Error>;

    /// Latest confirmed block's timestamp, used to evaluate `closureTime`.
    async fn get_block_timestamp(&self) -> Result<Duration, Error>;

    /// Event stream for `OpenedChannel`/`ClosedChannel`, filtered to events
    /// naming `channel_id`'s participants (§6).
    async fn subscribe_channel_events(
        &self,
        channel_id: ChannelId,
    ) -> Result<Receiver<ChainEvent>, Error>;

    /// New block timestamps, used by `withdraw`'s unbounded block-wait
    /// (§5's timeout (d)). On disconnect the caller must re-subscribe.
    async fn subscribe_new_blocks(&self) -> Result<Receiver<Duration>, Error>;

    /// Test-only hook replacing the `mineBlock` test hack (§9): advances
    /// the backend's notion of block time by `by`. Production
    /// implementations never call this themselves; only a test harness
    /// does, which is why it lives on the trait rather than behind a
    /// feature flag on each method.
    async fn test_block_advance(&self, by: Duration);
}

/// The `SETTLE_CHANNEL` stream protocol's sending side (§4.5, §6):
/// answered over the P2P transport rather than the chain, so it is kept
/// as its own seam instead of folded into [`ChainBackend`]. libp2p
/// streams, NAT traversal, and WebRTC upgrade are named external
/// collaborators (§1); this trait is the only way the closure protocol
/// reaches them.
#[async_trait]
pub trait SettlementTransport: Send + Sync {
    async fn send_settle_request(
        &self,
        counterparty: PeerId,
        request: SettleChannel,
    ) -> Result<(), Error>;
}
