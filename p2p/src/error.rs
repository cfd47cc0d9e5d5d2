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

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum Error {
    /// frame is {actual} bytes, expected exactly {expected} bytes
    ///
    /// a trusted transport handing us a frame of the wrong size is a fatal
    /// error per the error classification (class 3) — it means the wire is
    /// not speaking our protocol, not that a peer is misbehaving.
    WrongFrameSize { expected: usize, actual: usize },

    /// embedded group element does not decode to a valid curve point
    InvalidGroupElement,

    /// embedded signature does not parse
    InvalidSignature,

    /// recovery id out of range (expected 0..=3)
    InvalidRecoveryId,
}
