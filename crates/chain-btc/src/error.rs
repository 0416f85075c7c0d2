use thiserror::Error;

/// Bitcoin chain operation errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("amount {value} sat is at or below the {dust} sat dust limit")]
    AmountBelowDust { value: u64, dust: u64 },

    #[error("insufficient balance: need {needed} sat, have {available} sat")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("cannot cover the amount within {max} inputs")]
    TooManyInputs { max: usize },

    #[error("fee reconciliation did not converge after one rebuild")]
    FeeShortfall,

    #[error("transaction build error: {0}")]
    TransactionBuild(String),

    #[error("signing error: {0}")]
    Signing(String),
}
