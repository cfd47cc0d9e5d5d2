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

//! The onion packet pipeline and payment-channel state machine behind a
//! metadata-private message relay.
//!
//! A message's sender picks a path of relays and hands [`pipeline::PipelineDriver::construct`]
//! the path, a fresh ephemeral scalar, and the message itself; it gets back a
//! fixed-size [`hopr_p2p::Packet`] indistinguishable from any other packet of
//! the same maximum hop count. Each relay along the way calls
//! [`pipeline::PipelineDriver::transform`] on arrival, which verifies the
//! header, checks for replay, settles the embedded payment-channel transfer
//! against whoever handed it the packet, and returns either the next packet
//! to forward or the delivered message.
//!
//! Everything outside this crate's scope — the libp2p transport, the chain
//! RPC client, the on-disk kv store, CLI configuration loading — is named in
//! [`hopr_channel::ChainBackend`] and [`hopr_channel::KvStore`] as the two
//! abstract seams a real node plugs concrete implementations into.

#[macro_use]
extern crate amplify_derive;

pub mod config;
pub mod error;
pub mod onion;
pub mod pipeline;
pub mod replay;

pub use config::{Config, Network};
pub use error::{Classified, DropReason, FatalError, RecoverableError};
pub use onion::{Hop, PeelOutcome};
pub use pipeline::{Effect, PipelineDriver};
pub use replay::{InMemoryReplayGuard, KvReplayGuard, ReplayGuard};

/// Runs every workspace crate's own fixed-vector self-test (§7's class-3
/// startup check). A node calls this once before accepting traffic; a
/// failure here is always [`FatalError::SelfTestFailed`], never logged as
/// anything less severe.
pub fn selftest() -> Result<(), Classified> {
    hopr_crypto::selftest().map_err(Classified::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selftest_passes() {
        selftest().expect("crate self-test must pass");
    }

    #[test]
    fn default_config_round_trips_into_a_channel_config() {
        let config = Config::default();
        let channel_config = config.channel_config();
        assert_eq!(channel_config.relay_fee, config.relay_fee);
        assert_eq!(channel_config.settlement_timeout, config.settlement_timeout);
    }
}
