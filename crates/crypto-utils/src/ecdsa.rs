use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Scalar, Secp256k1, SecretKey};

use crate::error::CryptoError;

/// Derive the 33-byte compressed public key for a 32-byte secret key.
pub fn pubkey_from_priv(priv_bytes: &[u8; 32]) -> Result<[u8; 33], CryptoError> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(priv_bytes)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
    Ok(PublicKey::from_secret_key(&secp, &sk).serialize())
}

/// Sign a 32-byte message digest, returning the 64-byte compact signature
/// (low-S, RFC 6979 deterministic) and the recovery id.
pub fn sign_ecdsa(msg32: &[u8; 32], priv_bytes: &[u8; 32]) -> Result<([u8; 64], u8), CryptoError> {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(priv_bytes)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
    let msg = Message::from_digest(*msg32);
    let (rec_id, compact) = secp
        .sign_ecdsa_recoverable(&msg, &sk)
        .serialize_compact();
    Ok((compact, rec_id.to_i32() as u8))
}

/// Verify a 64-byte compact signature over a 32-byte digest.
///
/// Returns `Ok(false)` on a well-formed but incorrect signature; `Err` only
/// when the inputs themselves are malformed.
pub fn verify_ecdsa(
    msg32: &[u8; 32],
    sig64: &[u8; 64],
    pubkey: &[u8; 33],
) -> Result<bool, CryptoError> {
    let secp = Secp256k1::verification_only();
    let sig = Signature::from_compact(sig64)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let pk = PublicKey::from_slice(pubkey)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let msg = Message::from_digest(*msg32);
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

/// Recover the compressed public key from a compact signature and its
/// recovery id.
pub fn recover_pubkey(
    msg32: &[u8; 32],
    sig64: &[u8; 64],
    recovery_id: u8,
) -> Result<[u8; 33], CryptoError> {
    let secp = Secp256k1::new();
    let rec_id = RecoveryId::from_i32(recovery_id as i32)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let sig = RecoverableSignature::from_compact(sig64, rec_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let msg = Message::from_digest(*msg32);
    let pk = secp
        .recover_ecdsa(&msg, &sig)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    Ok(pk.serialize())
}

/// Add a scalar tweak to a secret key: `(priv + tweak) mod n`.
pub fn tweak_add_priv(priv_bytes: &[u8; 32], tweak: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let sk = SecretKey::from_slice(priv_bytes)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
    let scalar =
        Scalar::from_be_bytes(*tweak).map_err(|e| CryptoError::InvalidTweak(e.to_string()))?;
    let tweaked = sk
        .add_tweak(&scalar)
        .map_err(|e| CryptoError::InvalidTweak(e.to_string()))?;
    Ok(tweaked.secret_bytes())
}

/// Add `tweak * G` to a public key point.
pub fn tweak_add_pub(pubkey: &[u8; 33], tweak: &[u8; 32]) -> Result<[u8; 33], CryptoError> {
    let secp = Secp256k1::new();
    let pk = PublicKey::from_slice(pubkey)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let scalar =
        Scalar::from_be_bytes(*tweak).map_err(|e| CryptoError::InvalidTweak(e.to_string()))?;
    let tweaked = pk
        .add_exp_tweak(&secp, &scalar)
        .map_err(|e| CryptoError::InvalidTweak(e.to_string()))?;
    Ok(tweaked.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::sha256;

    const SK: [u8; 32] = [0xcd; 32];

    #[test]
    fn sign_and_verify_roundtrip() {
        let digest = sha256(b"a message to sign");
        let pubkey = pubkey_from_priv(&SK).unwrap();
        let (sig, _rec) = sign_ecdsa(&digest, &SK).unwrap();
        assert!(verify_ecdsa(&digest, &sig, &pubkey).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let digest = sha256(b"original");
        let tampered = sha256(b"tampered");
        let pubkey = pubkey_from_priv(&SK).unwrap();
        let (sig, _rec) = sign_ecdsa(&digest, &SK).unwrap();
        assert!(!verify_ecdsa(&tampered, &sig, &pubkey).unwrap());
    }

    #[test]
    fn signing_is_deterministic() {
        let digest = sha256(b"rfc 6979");
        let (sig1, rec1) = sign_ecdsa(&digest, &SK).unwrap();
        let (sig2, rec2) = sign_ecdsa(&digest, &SK).unwrap();
        assert_eq!(sig1, sig2);
        assert_eq!(rec1, rec2);
    }

    #[test]
    fn signatures_are_low_s() {
        // secp256k1 normalizes to low-S; re-normalizing must not change the
        // signature.
        let digest = sha256(b"low s check");
        let (sig, _rec) = sign_ecdsa(&digest, &SK).unwrap();
        let mut parsed = Signature::from_compact(&sig).unwrap();
        parsed.normalize_s();
        assert_eq!(parsed.serialize_compact(), sig);
    }

    #[test]
    fn recover_matches_pubkey() {
        let digest = sha256(b"recoverable");
        let pubkey = pubkey_from_priv(&SK).unwrap();
        let (sig, rec) = sign_ecdsa(&digest, &SK).unwrap();
        assert_eq!(recover_pubkey(&digest, &sig, rec).unwrap(), pubkey);
    }

    #[test]
    fn tweak_add_commutes_with_point_mul() {
        // (priv + t)·G == priv·G + t·G
        let tweak = sha256(b"tweak");
        let tweaked_priv = tweak_add_priv(&SK, &tweak).unwrap();
        let lhs = pubkey_from_priv(&tweaked_priv).unwrap();
        let base_pub = pubkey_from_priv(&SK).unwrap();
        let rhs = tweak_add_pub(&base_pub, &tweak).unwrap();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn zero_private_key_is_rejected() {
        let digest = sha256(b"x");
        assert!(sign_ecdsa(&digest, &[0u8; 32]).is_err());
        assert!(pubkey_from_priv(&[0u8; 32]).is_err());
    }
}
