//! # crypto-utils
//!
//! Hashing, ECDSA, address-level encodings, memory safety, and secure random
//! generation primitives shared by the wallet crates.

pub mod ecdsa;
pub mod encoding;
pub mod error;
pub mod hashes;
pub mod random;
pub mod zeroizing;

pub use error::CryptoError;
pub use zeroizing::{ZeroizingBytes, ZeroizingString};
