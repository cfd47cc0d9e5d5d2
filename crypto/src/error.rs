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

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// provided group element does not decode to a valid curve point
    InvalidGroupElement,

    /// provided scalar is not a valid secp256k1 private key
    #[from]
    InvalidScalar(secp256k1::Error),

    /// crypto primitive self-test failed; refusing to process packets
    SelfTestFailed,
}
