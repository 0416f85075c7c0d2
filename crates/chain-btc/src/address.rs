use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, Script, ScriptBuf, WPubkeyHash};
use crypto_utils::encoding::{base58check_decode, base58check_encode, segwit_decode, segwit_encode};
use crypto_utils::hashes::hash160;

use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Output script families the wallet can own and pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// Legacy pay-to-pubkey-hash (BIP-44).
    P2pkh,
    /// Native SegWit v0 pay-to-witness-pubkey-hash (BIP-84).
    P2wpkh,
}

impl ScriptType {
    /// Relay dust threshold for an output of this type, in satoshis.
    pub fn dust_limit(self) -> u64 {
        match self {
            ScriptType::P2pkh => 546,
            ScriptType::P2wpkh => 294,
        }
    }

    /// Estimated virtual size of one spending input, in vbytes.
    pub fn input_vbytes(self) -> u64 {
        match self {
            ScriptType::P2pkh => 148,
            ScriptType::P2wpkh => 68,
        }
    }

    /// Estimated virtual size of one output, in vbytes.
    pub fn output_vbytes(self) -> u64 {
        match self {
            ScriptType::P2pkh => 34,
            ScriptType::P2wpkh => 31,
        }
    }
}

/// Derive the address string for a compressed public key.
pub fn pubkey_to_address(
    pubkey: &[u8; 33],
    script_type: ScriptType,
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let digest = hash160(pubkey);
    match script_type {
        ScriptType::P2pkh => {
            let mut payload = Vec::with_capacity(21);
            payload.push(network.p2pkh_version());
            payload.extend_from_slice(&digest);
            Ok(base58check_encode(&payload))
        }
        ScriptType::P2wpkh => segwit_encode(network.bech32_hrp(), 0, &digest)
            .map_err(|e| BtcError::InvalidPublicKey(e.to_string())),
    }
}

/// Derive the output script a compressed public key locks to.
pub fn pubkey_to_script(pubkey: &[u8; 33], script_type: ScriptType) -> Result<ScriptBuf, BtcError> {
    let digest = hash160(pubkey);
    match script_type {
        ScriptType::P2pkh => {
            let pkh = PubkeyHash::from_slice(&digest)
                .map_err(|e| BtcError::InvalidPublicKey(e.to_string()))?;
            Ok(ScriptBuf::new_p2pkh(&pkh))
        }
        ScriptType::P2wpkh => {
            let wpkh = WPubkeyHash::from_slice(&digest)
                .map_err(|e| BtcError::InvalidPublicKey(e.to_string()))?;
            Ok(ScriptBuf::new_p2wpkh(&wpkh))
        }
    }
}

/// Parse an address into its output script, enforcing the network.
///
/// Fails with `InvalidAddress` when the checksum is wrong, the HRP or
/// version byte belongs to another network, or the script family is
/// unsupported.
pub fn address_to_script(address: &str, network: BtcNetwork) -> Result<ScriptBuf, BtcError> {
    // Bech32 first: every supported network HRP is unambiguous.
    if let Ok((hrp, version, program)) = segwit_decode(address) {
        if hrp != network.bech32_hrp() {
            return Err(BtcError::InvalidAddress(format!(
                "address {address} is not valid on {network}"
            )));
        }
        if version != 0 || program.len() != 20 {
            return Err(BtcError::InvalidAddress(format!(
                "unsupported witness output (version {version}, {} byte program)",
                program.len()
            )));
        }
        let wpkh = WPubkeyHash::from_slice(&program)
            .map_err(|e| BtcError::InvalidAddress(e.to_string()))?;
        return Ok(ScriptBuf::new_p2wpkh(&wpkh));
    }

    let payload = base58check_decode(address)
        .map_err(|e| BtcError::InvalidAddress(e.to_string()))?;
    if payload.len() != 21 {
        return Err(BtcError::InvalidAddress(format!(
            "unexpected payload length {}",
            payload.len()
        )));
    }
    if payload[0] != network.p2pkh_version() {
        return Err(BtcError::InvalidAddress(format!(
            "address {address} is not valid on {network}"
        )));
    }
    let pkh = PubkeyHash::from_slice(&payload[1..])
        .map_err(|e| BtcError::InvalidAddress(e.to_string()))?;
    Ok(ScriptBuf::new_p2pkh(&pkh))
}

/// Render an output script as an address, or `None` for script families
/// outside the supported set (multisig, OP_RETURN, taproot, ...).
pub fn script_to_address(script: &Script, network: BtcNetwork) -> Option<String> {
    match script_type_of(script)? {
        ScriptType::P2pkh => {
            let mut payload = Vec::with_capacity(21);
            payload.push(network.p2pkh_version());
            payload.extend_from_slice(&script.as_bytes()[3..23]);
            Some(base58check_encode(&payload))
        }
        ScriptType::P2wpkh => {
            segwit_encode(network.bech32_hrp(), 0, &script.as_bytes()[2..22]).ok()
        }
    }
}

/// Classify an output script, or `None` if it is neither P2PKH nor P2WPKH.
pub fn script_type_of(script: &Script) -> Option<ScriptType> {
    if script.is_p2pkh() {
        Some(ScriptType::P2pkh)
    } else if script.is_p2wpkh() {
        Some(ScriptType::P2wpkh)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compressed pubkey for secret key 1; the canonical BIP-173 test key.
    fn test_pubkey() -> [u8; 33] {
        hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
            .unwrap()
            .try_into()
            .unwrap()
    }

    #[test]
    fn p2wpkh_mainnet_vector() {
        let addr = pubkey_to_address(&test_pubkey(), ScriptType::P2wpkh, BtcNetwork::Mainnet)
            .unwrap();
        assert_eq!(addr, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    #[test]
    fn p2pkh_mainnet_vector() {
        let addr =
            pubkey_to_address(&test_pubkey(), ScriptType::P2pkh, BtcNetwork::Mainnet).unwrap();
        assert_eq!(addr, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn regtest_uses_bcrt_hrp() {
        let addr = pubkey_to_address(&test_pubkey(), ScriptType::P2wpkh, BtcNetwork::Regtest)
            .unwrap();
        assert!(addr.starts_with("bcrt1q"), "got {addr}");
    }

    #[test]
    fn address_script_roundtrip_p2wpkh() {
        let script = pubkey_to_script(&test_pubkey(), ScriptType::P2wpkh).unwrap();
        let addr = script_to_address(&script, BtcNetwork::Mainnet).unwrap();
        let parsed = address_to_script(&addr, BtcNetwork::Mainnet).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn address_script_roundtrip_p2pkh() {
        let script = pubkey_to_script(&test_pubkey(), ScriptType::P2pkh).unwrap();
        let addr = script_to_address(&script, BtcNetwork::Testnet).unwrap();
        let parsed = address_to_script(&addr, BtcNetwork::Testnet).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn wrong_network_is_rejected() {
        let mainnet = pubkey_to_address(&test_pubkey(), ScriptType::P2wpkh, BtcNetwork::Mainnet)
            .unwrap();
        let err = address_to_script(&mainnet, BtcNetwork::Testnet).unwrap_err();
        assert!(matches!(err, BtcError::InvalidAddress(_)));

        let legacy =
            pubkey_to_address(&test_pubkey(), ScriptType::P2pkh, BtcNetwork::Mainnet).unwrap();
        assert!(address_to_script(&legacy, BtcNetwork::Regtest).is_err());
    }

    #[test]
    fn bad_checksum_is_rejected() {
        assert!(address_to_script(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5",
            BtcNetwork::Mainnet
        )
        .is_err());
        assert!(address_to_script("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMi", BtcNetwork::Mainnet)
            .is_err());
    }

    #[test]
    fn unsupported_scripts_have_no_address() {
        let op_return = ScriptBuf::new_op_return(*b"hi");
        assert_eq!(script_to_address(&op_return, BtcNetwork::Mainnet), None);
        assert_eq!(script_type_of(&op_return), None);
    }

    #[test]
    fn taproot_address_is_rejected() {
        // Witness v1 parses as bech32m but is outside the supported set.
        let err = address_to_script(
            "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0",
            BtcNetwork::Mainnet,
        )
        .unwrap_err();
        assert!(matches!(err, BtcError::InvalidAddress(_)));
    }

    #[test]
    fn dust_and_size_tables() {
        assert_eq!(ScriptType::P2pkh.dust_limit(), 546);
        assert_eq!(ScriptType::P2wpkh.dust_limit(), 294);
        assert_eq!(ScriptType::P2pkh.input_vbytes(), 148);
        assert_eq!(ScriptType::P2wpkh.input_vbytes(), 68);
        assert_eq!(ScriptType::P2pkh.output_vbytes(), 34);
        assert_eq!(ScriptType::P2wpkh.output_vbytes(), 31);
    }
}
