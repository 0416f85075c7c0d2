use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Bech32m, Fe32, Hrp};

use crate::error::CryptoError;

/// Checksum algorithm for bech32 strings: BIP-173 (`bech32`, segwit v0) or
/// BIP-350 (`bech32m`, segwit v1+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bech32Variant {
    Bech32,
    Bech32m,
}

/// Encode `payload` with a trailing 4-byte double-SHA256 checksum.
pub fn base58check_encode(payload: &[u8]) -> String {
    bs58::encode(payload).with_check().into_string()
}

/// Decode a Base58Check string, verifying and stripping the checksum.
pub fn base58check_decode(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(encoded)
        .with_check(None)
        .into_vec()
        .map_err(|e| CryptoError::Base58(e.to_string()))
}

/// Encode arbitrary bytes as a bech32 string under `hrp` with the requested
/// checksum variant.
pub fn bech32_encode(
    hrp: &str,
    payload: &[u8],
    variant: Bech32Variant,
) -> Result<String, CryptoError> {
    let hrp = Hrp::parse(hrp).map_err(|e| CryptoError::Bech32Encode(e.to_string()))?;
    let encoded = match variant {
        Bech32Variant::Bech32 => bech32::encode::<Bech32>(hrp, payload),
        Bech32Variant::Bech32m => bech32::encode::<Bech32m>(hrp, payload),
    };
    encoded.map_err(|e| CryptoError::Bech32Encode(e.to_string()))
}

/// Decode a bech32 string, returning the HRP, the payload bytes and which
/// checksum variant validated.
pub fn bech32_decode(encoded: &str) -> Result<(String, Vec<u8>, Bech32Variant), CryptoError> {
    if let Ok(parsed) = CheckedHrpstring::new::<Bech32>(encoded) {
        let hrp = parsed.hrp().to_string();
        let payload = parsed.byte_iter().collect();
        return Ok((hrp, payload, Bech32Variant::Bech32));
    }
    let parsed = CheckedHrpstring::new::<Bech32m>(encoded)
        .map_err(|e| CryptoError::Bech32Decode(e.to_string()))?;
    let hrp = parsed.hrp().to_string();
    let payload = parsed.byte_iter().collect();
    Ok((hrp, payload, Bech32Variant::Bech32m))
}

/// Encode a segwit address: witness version + program under `hrp`.
///
/// Version 0 uses the BIP-173 checksum, later versions BIP-350, as consensus
/// requires.
pub fn segwit_encode(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String, CryptoError> {
    let hrp = Hrp::parse(hrp).map_err(|e| CryptoError::Bech32Encode(e.to_string()))?;
    let version = Fe32::try_from(witness_version)
        .map_err(|e| CryptoError::Bech32Encode(e.to_string()))?;
    bech32::segwit::encode(hrp, version, program)
        .map_err(|e| CryptoError::Bech32Encode(e.to_string()))
}

/// Decode a segwit address into `(hrp, witness_version, program)`.
pub fn segwit_decode(address: &str) -> Result<(String, u8, Vec<u8>), CryptoError> {
    let (hrp, version, program) = bech32::segwit::decode(address)
        .map_err(|e| CryptoError::Bech32Decode(e.to_string()))?;
    Ok((hrp.to_string(), version.to_u8(), program))
}
