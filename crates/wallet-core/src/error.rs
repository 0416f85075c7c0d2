use thiserror::Error;

use chain_btc::BtcError;
use crypto_utils::CryptoError;
use electrum_rpc::ElectrumError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("signer is disposed")]
    Disposed,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("fee oracle request failed: {0}")]
    FeeOracle(String),

    #[error(transparent)]
    Chain(#[from] BtcError),

    #[error(transparent)]
    Electrum(#[from] ElectrumError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_mnemonic() {
        let err = WalletError::InvalidMnemonic("bad checksum".into());
        assert_eq!(err.to_string(), "invalid mnemonic: bad checksum");
    }

    #[test]
    fn chain_errors_pass_through_unchanged() {
        let err: WalletError = BtcError::FeeShortfall.into();
        assert_eq!(
            err.to_string(),
            "fee reconciliation did not converge after one rebuild"
        );
    }

    #[test]
    fn electrum_errors_pass_through_unchanged() {
        let err: WalletError = ElectrumError::ConnectionClosed.into();
        assert_eq!(err.to_string(), "connection closed");
    }
}
