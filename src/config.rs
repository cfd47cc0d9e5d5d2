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

//! Replaces the `process.env` reads (`PROVIDER`, `CONTRACT_ADDRESS`,
//! `NETWORK`) named in Design Notes with an explicit struct passed at
//! startup. Loading it from a file or the environment is itself out of
//! scope — CLI configuration is a named external collaborator (§1).

use std::time::Duration;

use hopr_channel::ChannelConfig;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
pub enum Network {
    Production,
    Ganache,
    Custom(String),
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "serde_crate"))]
pub struct Config {
    pub provider_url: String,
    pub contract_address: [u8; 20],
    pub network: Network,
    pub relay_fee: u64,
    pub win_prob_numerator: u64,
    pub win_prob_denominator: u64,
    pub settlement_timeout: Duration,
    pub replay_retention: Duration,
}

impl Config {
    /// The slice of this config the channel state machine actually needs.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            relay_fee: self.relay_fee,
            win_prob_numerator: self.win_prob_numerator,
            win_prob_denominator: self.win_prob_denominator,
            settlement_timeout: self.settlement_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let channel = ChannelConfig::default();
        Config {
            provider_url: String::new(),
            contract_address: [0u8; 20],
            network: Network::Ganache,
            relay_fee: channel.relay_fee,
            win_prob_numerator: channel.win_prob_numerator,
            win_prob_denominator: channel.win_prob_denominator,
            settlement_timeout: channel.settlement_timeout,
            replay_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_config_mirrors_flattened_fields() {
        let config = Config {
            relay_fee: 3,
            ..Config::default()
        };
        assert_eq!(config.channel_config().relay_fee, 3);
    }
}
