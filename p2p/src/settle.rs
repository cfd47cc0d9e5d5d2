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

//! The `SETTLE_CHANNEL` stream protocol: one length-prefixed `channelId`
//! sent from the requester to the counterparty, asking it to cooperate on
//! closing the named channel before the unilateral timeout fires.

use crate::addr::ChannelId;
use crate::error::Error;

const CHANNEL_ID_SIZE: usize = 32;

/// A single `SETTLE_CHANNEL` request. Unlike the packet frame, this
/// protocol is its own stream and so is free to use a length prefix —
/// here the length is fixed, but the prefix still makes the message
/// self-describing to a transport that frames by length.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SettleChannel {
    pub channel_id: ChannelId,
}

impl SettleChannel {
    /// `len(u32 big-endian) ‖ channelId(32)`.
    pub fn encode(&self) -> [u8; 4 + CHANNEL_ID_SIZE] {
        let mut buf = [0u8; 4 + CHANNEL_ID_SIZE];
        buf[..4].copy_from_slice(&(CHANNEL_ID_SIZE as u32).to_be_bytes());
        buf[4..].copy_from_slice(self.channel_id.as_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 4 + CHANNEL_ID_SIZE {
            return Err(Error::WrongFrameSize {
                expected: 4 + CHANNEL_ID_SIZE,
                actual: bytes.len(),
            });
        }
        let len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
        if len != CHANNEL_ID_SIZE {
            return Err(Error::WrongFrameSize {
                expected: CHANNEL_ID_SIZE,
                actual: len,
            });
        }
        let mut channel_id = [0u8; CHANNEL_ID_SIZE];
        channel_id.copy_from_slice(&bytes[4..]);
        Ok(SettleChannel {
            channel_id: ChannelId::from_bytes(channel_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_bit_exact() {
        let request = SettleChannel {
            channel_id: ChannelId::from_bytes([0x42; CHANNEL_ID_SIZE]),
        };
        let encoded = request.encode();
        let decoded = SettleChannel::decode(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn rejects_mismatched_length_prefix() {
        let mut encoded = SettleChannel {
            channel_id: ChannelId::from_bytes([0x01; CHANNEL_ID_SIZE]),
        }
        .encode();
        encoded[3] = 31;
        assert!(matches!(
            SettleChannel::decode(&encoded),
            Err(Error::WrongFrameSize { .. })
        ));
    }
}
