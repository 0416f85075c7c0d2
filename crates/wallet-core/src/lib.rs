//! # wallet-core
//!
//! The wallet itself: BIP-39 mnemonic handling, BIP-32/44/84 key
//! derivation, the seed-backed signer, per-account operations (balance,
//! send, history) over an Electrum client, and the top-level wallet
//! registry with its fee-rate oracle.

pub mod account;
pub mod config;
pub mod error;
pub mod fees;
pub mod hd;
pub mod mnemonic;
pub mod signer;
pub mod types;
pub mod wallet;

pub use account::Account;
pub use config::WalletConfig;
pub use error::WalletError;
pub use hd::HdNode;
pub use signer::Signer;
pub use types::Bip;
pub use wallet::Wallet;
