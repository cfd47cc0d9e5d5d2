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

//! The three-way error classification of §7. Every fallible path in the
//! pipeline resolves to exactly one of [`DropReason`], [`RecoverableError`]
//! or [`FatalError`], wrapped in [`Classified`] so the top-level driver
//! (`pipeline::PipelineDriver::transform` and its caller) is the only place that
//! decides between drop, retry and fatal shutdown — no lower layer logs
//! above `trace` or retries on its own.

use hopr_channel::Error as ChannelError;
use hopr_crypto::Error as CryptoError;
use hopr_p2p::Error as WireError;

/// Class 1 (§7): adversarial input. Never logged above `trace` — the
/// variant name itself is the only detail retained, so a log line can
/// never echo attacker-controlled bytes back at warning level or above.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum DropReason {
    /// header, transaction, challenge or message MAC did not verify
    MacMismatch,

    /// packet tag already present in the replay guard
    ReplayHit,

    /// ticket challenge does not recover to the claimed counterparty
    InvalidChallengeSigner,

    /// frame length does not match the fixed packet size
    MalformedLength,

    /// embedded transaction index is not the expected successor
    IndexRegression,

    /// transfer leaves less than the configured relay fee
    InsufficientFee,

    /// channel is not in a status that accepts this operation
    WrongChannelStatus,
}

/// Class 2 (§7): transient failures of an external collaborator. Retried
/// with backoff by the caller; surfaced as warnings, since nothing here
/// is attacker-controlled.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum RecoverableError {
    /// kv store reported a transient failure: {0}
    KvStore(String),

    /// chain backend reported a transient failure: {0}
    ChainBackend(String),

    /// no local record for an on-chain channel; rebuilding from chain state
    MissingRecord,
}

/// Class 3 (§7): the node cannot safely continue for the affected channel
/// or at all. Surfaced to the supervisor.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum FatalError {
    /// on-chain channel exists with no local record and no safe way to rebuild one
    StateDivergence,

    /// a nonce already consumed on this channel was submitted again
    NonceReuse,

    /// a cryptographic primitive failed its startup self-test
    SelfTestFailed,

    /// a trusted transport delivered a frame of the wrong size
    PacketSizeMismatch,
}

/// The pipeline driver's only error type: every lower-layer error is
/// classified into exactly one of the three kinds before it reaches here.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Classified {
    #[from]
    #[display(inner)]
    Drop(DropReason),

    #[from]
    #[display(inner)]
    Recoverable(RecoverableError),

    #[from]
    #[display(inner)]
    Fatal(FatalError),
}

impl From<CryptoError> for Classified {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidGroupElement => Classified::Drop(DropReason::MacMismatch),
            CryptoError::InvalidScalar(_) => Classified::Drop(DropReason::MacMismatch),
            CryptoError::SelfTestFailed => Classified::Fatal(FatalError::SelfTestFailed),
        }
    }
}

impl From<WireError> for Classified {
    fn from(err: WireError) -> Self {
        match err {
            WireError::WrongFrameSize { .. } => {
                Classified::Fatal(FatalError::PacketSizeMismatch)
            }
            WireError::InvalidGroupElement
            | WireError::InvalidSignature
            | WireError::InvalidRecoveryId => Classified::Drop(DropReason::MacMismatch),
        }
    }
}

impl From<ChannelError> for Classified {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::NoSuchChannel(_) => {
                Classified::Recoverable(RecoverableError::MissingRecord)
            }
            ChannelError::WrongStatus { .. } => {
                Classified::Drop(DropReason::WrongChannelStatus)
            }
            ChannelError::InvalidSignature => {
                Classified::Drop(DropReason::InvalidChallengeSigner)
            }
            ChannelError::InvalidRecoveryId => {
                Classified::Drop(DropReason::InvalidChallengeSigner)
            }
            ChannelError::IndexRegression { .. } => {
                Classified::Drop(DropReason::IndexRegression)
            }
            ChannelError::InsufficientFee { .. } => {
                Classified::Drop(DropReason::InsufficientFee)
            }
            ChannelError::InsufficientBalance { .. } => {
                Classified::Drop(DropReason::InsufficientFee)
            }
            ChannelError::NonceReuse => Classified::Fatal(FatalError::NonceReuse),
            ChannelError::StateDivergence => Classified::Fatal(FatalError::StateDivergence),
            ChannelError::ChainBackend(msg) => {
                Classified::Recoverable(RecoverableError::ChainBackend(msg))
            }
            ChannelError::KvStore(msg) => {
                Classified::Recoverable(RecoverableError::KvStore(msg))
            }
            ChannelError::NothingToSettle => {
                Classified::Drop(DropReason::WrongChannelStatus)
            }
            ChannelError::Crypto(inner) => inner.into(),
            ChannelError::Wire(inner) => inner.into(),
        }
    }
}

/// Logs `err` at the level its class permits (§7's "never above trace for
/// adversarial input" rule) and returns it unchanged, for use at the one
/// point in the pipeline driver where classification is final.
pub fn log_and_pass(err: Classified) -> Classified {
    match &err {
        Classified::Drop(reason) => log::trace!("dropping packet: {}", reason),
        Classified::Recoverable(reason) => log::warn!("recoverable error: {}", reason),
        Classified::Fatal(reason) => log::error!("fatal error: {}", reason),
    }
    err
}
