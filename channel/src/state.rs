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

use std::collections::BTreeSet;
use std::time::Duration;

use hopr_p2p::addr::{Address, ChannelId, PeerId};
use strict_encoding::{StrictDecode, StrictEncode};

use crate::transaction::SignedTransaction;

/// Where a channel sits in its lifecycle. Mirrors on-chain state modulo a
/// bounded lag (§3): off-chain status may lead on-chain status by at most
/// one transition, the optimistic one taken at submission.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, StrictEncode, StrictDecode,
)]
#[repr(u8)]
pub enum ChannelStatus {
    #[display("UNINITIALISED")]
    Uninitialised = 0,

    #[display("FUNDING")]
    Funding = 1,

    #[display("OPEN")]
    Open = 2,

    #[display("PENDING_CLOSURE")]
    PendingClosure = 3,

    #[display("WITHDRAWABLE")]
    Withdrawable = 4,

    #[display("CLOSED")]
    Closed = 5,
}

impl ChannelStatus {
    /// Decodes the on-chain `stateCounter mod 10` encoding (§6).
    pub fn from_state_counter(state_counter: u64) -> Option<Self> {
        match state_counter % 10 {
            0 => Some(ChannelStatus::Uninitialised),
            1 => Some(ChannelStatus::Funding),
            2 => Some(ChannelStatus::Open),
            3 => Some(ChannelStatus::PendingClosure),
            4 => Some(ChannelStatus::Withdrawable),
            5 => Some(ChannelStatus::Closed),
            _ => None,
        }
    }
}

/// The per-counterparty record (§3). `channel_id` and `counterparty` are
/// immutable after construction; everything else evolves as transactions
/// land and on-chain events arrive.
#[derive(Clone, Debug)]
pub struct ChannelRecord {
    channel_id: ChannelId,
    counterparty: PeerId,
    self_address: Address,
    counterparty_address: Address,
    status: ChannelStatus,
    balance: u64,
    party_a_balance: u64,
    closure_time: Option<Duration>,
    index: u64,
    latest_transaction: Option<SignedTransaction>,
    restore_transaction: Option<SignedTransaction>,
    stashed_restore_transaction: Option<SignedTransaction>,
    nonce_set: BTreeSet<[u8; 32]>,
    pending_outgoing_index: Option<u64>,
}

impl ChannelRecord {
    pub fn new(
        channel_id: ChannelId,
        counterparty: PeerId,
        self_address: Address,
        counterparty_address: Address,
    ) -> Self {
        ChannelRecord {
            channel_id,
            counterparty,
            self_address,
            counterparty_address,
            status: ChannelStatus::Uninitialised,
            balance: 0,
            party_a_balance: 0,
            closure_time: None,
            index: 0,
            latest_transaction: None,
            restore_transaction: None,
            stashed_restore_transaction: None,
            nonce_set: BTreeSet::new(),
            pending_outgoing_index: None,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn counterparty(&self) -> PeerId {
        self.counterparty
    }

    pub fn self_address(&self) -> Address {
        self.self_address
    }

    pub fn counterparty_address(&self) -> Address {
        self.counterparty_address
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn party_a_balance(&self) -> u64 {
        self.party_a_balance
    }

    pub fn closure_time(&self) -> Option<Duration> {
        self.closure_time
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// `true` iff `self_address` holds the partyA role, i.e. is the
    /// lexicographically smaller of the two on-chain addresses (§4.5's
    /// funding direction rule).
    pub fn is_party_a(&self) -> bool {
        self.self_address <= self.counterparty_address
    }

    pub fn set_status(&mut self, status: ChannelStatus) {
        self.status = status;
    }

    pub fn set_balances(&mut self, balance: u64, party_a_balance: u64) {
        self.balance = balance;
        self.party_a_balance = party_a_balance;
    }

    pub fn set_closure_time(&mut self, closure_time: Option<Duration>) {
        self.closure_time = closure_time;
    }

    pub fn latest_transaction(&self) -> Option<&SignedTransaction> {
        self.latest_transaction.as_ref()
    }

    pub fn restore_transaction(&self) -> Option<&SignedTransaction> {
        self.restore_transaction.as_ref()
    }

    pub fn stashed_restore_transaction(&self) -> Option<&SignedTransaction> {
        self.stashed_restore_transaction.as_ref()
    }

    /// Accepts `tx` as the channel's new frontier: bumps `index`, records
    /// `tx` as the latest transaction, and rotates the previous latest
    /// transaction into the restore slot so a crash can still recover a
    /// settleable transaction.
    pub fn accept_transaction(&mut self, tx: SignedTransaction) {
        self.index = tx.transaction.index;
        // `value` carries the new partyA balance after this transfer (§4.5).
        self.party_a_balance = tx.transaction.value;
        if let Some(previous) = self.latest_transaction.take() {
            self.restore_transaction = Some(previous);
        }
        self.latest_transaction = Some(tx);
        if self.pending_outgoing_index.map_or(false, |i| i <= self.index) {
            self.pending_outgoing_index = None;
        }
    }

    /// Records that `transfer` just handed the counterparty a
    /// self-signed update at `index` that this record has not itself
    /// persisted (§4.5: `transfer` signs but does not persist). Until it
    /// is superseded by an absorbed transaction at or past `index`, the
    /// counterparty is the only side holding proof of it.
    pub fn record_pending_outgoing(&mut self, index: u64) {
        self.pending_outgoing_index = Some(index);
    }

    /// `true` iff the counterparty may be holding a transaction more
    /// recent than anything this record can itself submit (§4.5's closure
    /// protocol: `localIndex > ourLastTx.index`).
    pub fn counterparty_may_be_ahead(&self) -> bool {
        self.pending_outgoing_index.is_some()
    }

    /// The sole defense against a counterparty submitting the same signed
    /// update twice (§4.5's `testAndSetNonce`): returns `true` only the
    /// first time `key` is seen on this channel.
    pub fn test_and_set_nonce(&mut self, key: [u8; 32]) -> bool {
        self.nonce_set.insert(key)
    }

    pub fn nonce_set(&self) -> &BTreeSet<[u8; 32]> {
        &self.nonce_set
    }
}
