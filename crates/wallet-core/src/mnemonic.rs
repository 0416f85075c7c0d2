use bip39::{Language, Mnemonic};
use crypto_utils::random::random_bytes_fixed;
use crypto_utils::{ZeroizingBytes, ZeroizingString};
use zeroize::Zeroize;

use crate::error::WalletError;

/// Generate a fresh BIP-39 English mnemonic of 12 or 24 words.
pub fn generate_mnemonic(word_count: usize) -> Result<String, WalletError> {
    let mnemonic = match word_count {
        12 => {
            let mut entropy: [u8; 16] = random_bytes_fixed();
            let m = Mnemonic::from_entropy_in(Language::English, &entropy);
            entropy.zeroize();
            m
        }
        24 => {
            let mut entropy: [u8; 32] = random_bytes_fixed();
            let m = Mnemonic::from_entropy_in(Language::English, &entropy);
            entropy.zeroize();
            m
        }
        other => {
            return Err(WalletError::InvalidMnemonic(format!(
                "unsupported word count {other}, expected 12 or 24"
            )))
        }
    };
    mnemonic
        .map(|m| m.to_string())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

/// Validate a mnemonic phrase against the word list and checksum.
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Derive the 64-byte BIP-39 seed (PBKDF2-HMAC-SHA512, 2048 rounds, salt
/// `"mnemonic" + passphrase`). The result is wiped on drop.
pub fn mnemonic_to_seed(phrase: &str, passphrase: &str) -> Result<ZeroizingBytes, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(ZeroizingBytes::from(mnemonic.to_seed(passphrase)))
}

/// A validated mnemonic whose phrase is wiped on drop.
pub struct ValidatedMnemonic {
    phrase: ZeroizingString,
}

impl ValidatedMnemonic {
    pub fn new(phrase: &str) -> Result<Self, WalletError> {
        if !validate_mnemonic(phrase) {
            return Err(WalletError::InvalidMnemonic(
                "checksum or word list mismatch".into(),
            ));
        }
        Ok(Self { phrase: phrase.into() })
    }

    pub fn as_str(&self) -> &str {
        &self.phrase
    }

    pub fn to_seed(&self, passphrase: &str) -> Result<ZeroizingBytes, WalletError> {
        mnemonic_to_seed(&self.phrase, passphrase)
    }
}
