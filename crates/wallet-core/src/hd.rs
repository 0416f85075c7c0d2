use bitcoin::bip32::{DerivationPath, Fingerprint, Xpriv, Xpub};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use chain_btc::BtcNetwork;
use crypto_utils::encoding::base58check_encode;

use crate::error::WalletError;
use crate::types::Bip;

/// Extended-key version bytes by purpose and network: xprv/xpub and tprv/
/// tpub for BIP-44, zprv/zpub and vprv/vpub for BIP-84.
fn version_bytes(bip: Bip, network: BtcNetwork, private: bool) -> [u8; 4] {
    match (bip, network, private) {
        (Bip::Bip44, BtcNetwork::Mainnet, true) => [0x04, 0x88, 0xAD, 0xE4],
        (Bip::Bip44, BtcNetwork::Mainnet, false) => [0x04, 0x88, 0xB2, 0x1E],
        (Bip::Bip44, _, true) => [0x04, 0x35, 0x83, 0x94],
        (Bip::Bip44, _, false) => [0x04, 0x35, 0x87, 0xCF],
        (Bip::Bip84, BtcNetwork::Mainnet, true) => [0x04, 0xB2, 0x43, 0x0C],
        (Bip::Bip84, BtcNetwork::Mainnet, false) => [0x04, 0xB2, 0x47, 0x46],
        (Bip::Bip84, _, true) => [0x04, 0x5F, 0x18, 0xBC],
        (Bip::Bip84, _, false) => [0x04, 0x5F, 0x1C, 0xF6],
    }
}

/// The account-level path `m/purpose'/coin_type'/account'`.
pub fn account_path(bip: Bip, network: BtcNetwork, account: u32) -> Result<DerivationPath, WalletError> {
    parse_path(&format!("m/{}'/{}'/{account}'", bip.purpose(), network.coin_type()))
}

/// The full leaf path `m/purpose'/coin_type'/account'/change/index`.
pub fn leaf_path(
    bip: Bip,
    network: BtcNetwork,
    account: u32,
    change: bool,
    index: u32,
) -> Result<DerivationPath, WalletError> {
    parse_path(&format!(
        "m/{}'/{}'/{account}'/{}/{index}",
        bip.purpose(),
        network.coin_type(),
        u32::from(change)
    ))
}

/// Parse a path string, mapping malformed or out-of-range indices.
pub fn parse_path(path: &str) -> Result<DerivationPath, WalletError> {
    path.parse()
        .map_err(|e: bitcoin::bip32::Error| WalletError::InvalidPath(e.to_string()))
}

/// One BIP-32 node: chain code plus either a private key (with its
/// derivable public half) or, when neutered, the public key alone.
#[derive(Clone)]
pub struct HdNode {
    network: BtcNetwork,
    xprv: Option<Xpriv>,
    xpub: Xpub,
}

impl HdNode {
    /// Master node from a BIP-39 seed: `HMAC-SHA512("Bitcoin seed", seed)`,
    /// left half key (range-checked), right half chain code.
    pub fn from_seed(seed: &[u8], network: BtcNetwork) -> Result<Self, WalletError> {
        let xprv = Xpriv::new_master(network.to_bitcoin_network(), seed)
            .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
        let secp = Secp256k1::new();
        let xpub = Xpub::from_priv(&secp, &xprv);
        Ok(Self { network, xprv: Some(xprv), xpub })
    }

    /// Derive a descendant. Hardened steps require the private half and
    /// fail on a neutered node.
    pub fn derive(&self, path: &DerivationPath) -> Result<Self, WalletError> {
        let secp = Secp256k1::new();
        match &self.xprv {
            Some(xprv) => {
                let child = xprv
                    .derive_priv(&secp, path)
                    .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
                let xpub = Xpub::from_priv(&secp, &child);
                Ok(Self { network: self.network, xprv: Some(child), xpub })
            }
            None => {
                let xpub = self
                    .xpub
                    .derive_pub(&secp, path)
                    .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
                Ok(Self { network: self.network, xprv: None, xpub })
            }
        }
    }

    /// The public-only copy of this node.
    pub fn neuter(&self) -> Self {
        Self { network: self.network, xprv: None, xpub: self.xpub }
    }

    pub fn is_neutered(&self) -> bool {
        self.xprv.is_none()
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    /// First four bytes of HASH160 of the compressed public key.
    pub fn fingerprint(&self) -> Fingerprint {
        self.xpub.fingerprint()
    }

    pub fn public_key(&self) -> [u8; 33] {
        self.xpub.public_key.serialize()
    }

    pub fn secret_key(&self) -> Option<SecretKey> {
        self.xprv.as_ref().map(|xprv| xprv.private_key)
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.xpub.chain_code.to_bytes()
    }

    pub fn depth(&self) -> u8 {
        self.xpub.depth
    }

    /// Serialize the private half as a Base58Check extended key with the
    /// purpose's version bytes (xprv / tprv / zprv / vprv).
    pub fn to_extended_private(&self, bip: Bip) -> Result<String, WalletError> {
        let xprv = self
            .xprv
            .as_ref()
            .ok_or_else(|| WalletError::DerivationFailed("node is neutered".into()))?;
        let mut data = Vec::with_capacity(78);
        data.extend_from_slice(&version_bytes(bip, self.network, true));
        data.push(xprv.depth);
        data.extend_from_slice(xprv.parent_fingerprint.as_bytes());
        data.extend_from_slice(&u32::from(xprv.child_number).to_be_bytes());
        data.extend_from_slice(xprv.chain_code.as_bytes());
        data.push(0x00);
        data.extend_from_slice(&xprv.private_key.secret_bytes());
        Ok(base58check_encode(&data))
    }

    /// Serialize the public half with the purpose's version bytes
    /// (xpub / tpub / zpub / vpub).
    pub fn to_extended_public(&self, bip: Bip) -> String {
        let mut data = Vec::with_capacity(78);
        data.extend_from_slice(&version_bytes(bip, self.network, false));
        data.push(self.xpub.depth);
        data.extend_from_slice(self.xpub.parent_fingerprint.as_bytes());
        data.extend_from_slice(&u32::from(self.xpub.child_number).to_be_bytes());
        data.extend_from_slice(self.xpub.chain_code.as_bytes());
        data.extend_from_slice(&self.xpub.public_key.serialize());
        base58check_encode(&data)
    }

    /// WIF encoding of the private key (compressed-pubkey flavor).
    pub fn to_wif(&self) -> Result<String, WalletError> {
        let xprv = self
            .xprv
            .as_ref()
            .ok_or_else(|| WalletError::DerivationFailed("node is neutered".into()))?;
        let mut data = Vec::with_capacity(34);
        data.push(self.network.wif_version());
        data.extend_from_slice(&xprv.private_key.secret_bytes());
        data.push(0x01);
        Ok(base58check_encode(&data))
    }
}
