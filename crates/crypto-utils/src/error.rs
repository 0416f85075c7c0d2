use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid tweak: {0}")]
    InvalidTweak(String),

    #[error("base58 decoding failed: {0}")]
    Base58(String),

    #[error("bech32 encoding failed: {0}")]
    Bech32Encode(String),

    #[error("bech32 decoding failed: {0}")]
    Bech32Decode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
