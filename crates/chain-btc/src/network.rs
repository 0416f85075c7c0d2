use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    #[default]
    #[serde(rename = "bitcoin", alias = "mainnet")]
    Mainnet,
    Testnet,
    Regtest,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Regtest => Network::Regtest,
        }
    }

    /// BIP-44 coin type for this network.
    pub fn coin_type(self) -> u32 {
        match self {
            BtcNetwork::Mainnet => 0,
            BtcNetwork::Testnet | BtcNetwork::Regtest => 1,
        }
    }

    /// Bech32 human-readable part for P2WPKH addresses.
    pub fn bech32_hrp(self) -> &'static str {
        match self {
            BtcNetwork::Mainnet => "bc",
            BtcNetwork::Testnet => "tb",
            BtcNetwork::Regtest => "bcrt",
        }
    }

    /// Base58 version byte for P2PKH addresses.
    pub fn p2pkh_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x00,
            BtcNetwork::Testnet | BtcNetwork::Regtest => 0x6F,
        }
    }

    /// Base58 version byte for WIF private-key encoding.
    pub fn wif_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x80,
            BtcNetwork::Testnet | BtcNetwork::Regtest => 0xEF,
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "bitcoin"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_bitcoin_network() {
        assert_eq!(BtcNetwork::Mainnet.to_bitcoin_network(), Network::Bitcoin);
        assert_eq!(BtcNetwork::Testnet.to_bitcoin_network(), Network::Testnet);
        assert_eq!(BtcNetwork::Regtest.to_bitcoin_network(), Network::Regtest);
    }

    #[test]
    fn coin_types() {
        assert_eq!(BtcNetwork::Mainnet.coin_type(), 0);
        assert_eq!(BtcNetwork::Testnet.coin_type(), 1);
        assert_eq!(BtcNetwork::Regtest.coin_type(), 1);
    }

    #[test]
    fn address_parameters() {
        assert_eq!(BtcNetwork::Mainnet.bech32_hrp(), "bc");
        assert_eq!(BtcNetwork::Regtest.bech32_hrp(), "bcrt");
        assert_eq!(BtcNetwork::Mainnet.p2pkh_version(), 0x00);
        assert_eq!(BtcNetwork::Testnet.p2pkh_version(), 0x6F);
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&BtcNetwork::Mainnet).unwrap(),
            "\"bitcoin\""
        );
        let parsed: BtcNetwork = serde_json::from_str("\"regtest\"").unwrap();
        assert_eq!(parsed, BtcNetwork::Regtest);
    }

    #[test]
    fn display_names() {
        assert_eq!(BtcNetwork::Mainnet.to_string(), "bitcoin");
        assert_eq!(BtcNetwork::Regtest.to_string(), "regtest");
    }
}
