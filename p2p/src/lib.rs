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

//! Wire types for the HOPR peer protocol: the fixed-size packet frame
//! carried over the single libp2p stream, and the length-prefixed
//! `SETTLE_CHANNEL` message carried over its own stream protocol.
//!
//! Transport (libp2p streams, NAT traversal, WebRTC upgrade) is an external
//! collaborator; this crate only defines what goes *on* the wire.

#[macro_use]
extern crate amplify_derive;

pub mod addr;
mod error;
pub mod packet;
pub mod settle;

pub use addr::{ChannelId, PeerId};
pub use error::Error;
pub use packet::Packet;
pub use settle::SettleChannel;
