//! # chain-btc
//!
//! Bitcoin-side building blocks: network parameters, the address/script
//! codec, fee-aware UTXO selection, and the PSBT transaction builder.

pub mod address;
pub mod error;
pub mod network;
pub mod transaction;
pub mod utxo;

pub use error::BtcError;
pub use network::BtcNetwork;
