use chain_btc::address::ScriptType;
use crypto_utils::ZeroizingBytes;
use serde::{Deserialize, Serialize};

/// Derivation purpose: which BIP the account follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bip {
    /// Legacy P2PKH accounts, `m/44'/...`.
    #[serde(rename = "44")]
    Bip44,
    /// Native SegWit P2WPKH accounts, `m/84'/...`.
    #[default]
    #[serde(rename = "84")]
    Bip84,
}

impl Bip {
    /// The purpose level of the derivation path.
    pub fn purpose(self) -> u32 {
        match self {
            Bip::Bip44 => 44,
            Bip::Bip84 => 84,
        }
    }

    /// The output script family this purpose produces.
    pub fn script_type(self) -> ScriptType {
        match self {
            Bip::Bip44 => ScriptType::P2pkh,
            Bip::Bip84 => ScriptType::P2wpkh,
        }
    }
}

/// A signer's key material. `private` is `None` once the signer has been
/// disposed.
pub struct KeyPair {
    pub public: [u8; 33],
    pub private: Option<ZeroizingBytes>,
}
