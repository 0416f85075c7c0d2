use chain_btc::BtcNetwork;
use electrum_rpc::ElectrumConfig;
use serde::{Deserialize, Serialize};

use crate::types::Bip;

/// Top-level wallet configuration.
///
/// Defaults: mainnet, BIP-84 accounts, Blockstream's public Electrum
/// endpoint over TCP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: BtcNetwork,
    pub bip: Bip,
    pub electrum: ElectrumConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use electrum_rpc::Protocol;

    #[test]
    fn defaults() {
        let config = WalletConfig::default();
        assert_eq!(config.network, BtcNetwork::Mainnet);
        assert_eq!(config.bip, Bip::Bip84);
        assert_eq!(config.electrum.host, "electrum.blockstream.info");
        assert_eq!(config.electrum.port, 50001);
        assert_eq!(config.electrum.protocol, Protocol::Tcp);
    }

    #[test]
    fn parses_partial_json() {
        let config: WalletConfig = serde_json::from_str(
            r#"{"network":"regtest","bip":"44","electrum":{"host":"127.0.0.1","port":60401}}"#,
        )
        .unwrap();
        assert_eq!(config.network, BtcNetwork::Regtest);
        assert_eq!(config.bip, Bip::Bip44);
        assert_eq!(config.electrum.host, "127.0.0.1");
        assert_eq!(config.electrum.timeout_ms, 15_000);
    }
}
