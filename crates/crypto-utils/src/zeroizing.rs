use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// An owned byte buffer wiped with a non-optimizable zeroize when dropped.
///
/// All seed and private-key material in the wallet lives inside this type;
/// "disposing" a secret means dropping the buffer, never re-exposing a
/// zeroed field.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingBytes(Vec<u8>);

impl ZeroizingBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the contents into a fixed-size array, failing on length mismatch.
    pub fn to_array<const N: usize>(&self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        if self.0.len() != N {
            return None;
        }
        out.copy_from_slice(&self.0);
        Some(out)
    }
}

impl Deref for ZeroizingBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ZeroizingBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl<const N: usize> From<[u8; N]> for ZeroizingBytes {
    fn from(mut data: [u8; N]) -> Self {
        let buf = Self(data.to_vec());
        data.zeroize();
        buf
    }
}

/// A `String` wiped when dropped; used for mnemonic phrases.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingString(String);

impl ZeroizingString {
    pub fn new(data: String) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ZeroizingString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ZeroizingString {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&str> for ZeroizingString {
    fn from(data: &str) -> Self {
        Self::new(data.to_owned())
    }
}
