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

#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// channel {0} has no record on this node
    NoSuchChannel(hopr_p2p::addr::ChannelId),

    /// channel is in status {found}, expected one of {expected}
    WrongStatus {
        found: crate::state::ChannelStatus,
        expected: &'static str,
    },

    /// embedded or recovered signature does not verify
    InvalidSignature,

    /// recovery id out of range (expected 0..=3)
    InvalidRecoveryId,

    /// transaction index {given} is not the expected successor of {current}
    IndexRegression { current: u64, given: u64 },

    /// transfer of {amount} leaves an insufficient relay fee
    InsufficientFee { amount: u64 },

    /// transfer of {attempted} exceeds available balance {available}
    InsufficientBalance { attempted: u64, available: u64 },

    /// nonce has already been consumed on this channel — duplicate submission
    NonceReuse,

    /// on-chain channel exists with no local record; node cannot safely proceed
    StateDivergence,

    /// chain backend reported a transient failure: {0}
    ChainBackend(String),

    /// kv store reported a transient failure: {0}
    KvStore(String),

    /// no settleable transaction is available for this channel
    NothingToSettle,

    /// underlying crypto primitive rejected its input
    #[from]
    Crypto(hopr_crypto::Error),

    /// underlying wire codec rejected its input
    #[from]
    Wire(hopr_p2p::Error),
}
