/*!
Reversible byte transforms applied to encoded slot records.

The only non-trivial algorithm is repeating-key XOR. It keeps casual readers out of a
save file and nothing more: it is obfuscation, not encryption, and must not be treated
as a security boundary. A wrong key is never detected here; it produces bytes that the
record serializer later rejects.
*/

use crate::{KeepsakeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte transform used to obfuscate persisted records
///
/// Implementations must be self-inverse for a given key:
/// `transform(transform(data, key), key) == data`.
pub trait Cipher: Send + Sync {
    /// Apply the transform to `data` using `key`
    fn transform(&self, data: &[u8], key: &[u8]) -> Vec<u8>;

    /// The algorithm tag this cipher implements
    fn algorithm(&self) -> CipherAlgorithm;
}

/// Selectable cipher algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherAlgorithm {
    /// Bytes pass through untouched
    #[default]
    None,
    /// Repeating-key XOR over the password bytes
    Xor,
}

impl CipherAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Xor => "xor",
        }
    }

    /// Cipher implementation for this tag
    pub fn cipher(&self) -> Box<dyn Cipher> {
        match self {
            Self::None => Box::new(NoCipher),
            Self::Xor => Box::new(XorCipher),
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = KeepsakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "xor" => Ok(Self::Xor),
            other => Err(KeepsakeError::validation(format!(
                "Unknown cipher algorithm '{other}' (expected 'none' or 'xor')"
            ))),
        }
    }
}

/// Identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCipher;

impl Cipher for NoCipher {
    fn transform(&self, data: &[u8], _key: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::None
    }
}

/// Repeating-key XOR. An empty key leaves the data unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorCipher;

impl Cipher for XorCipher {
    fn transform(&self, data: &[u8], key: &[u8]) -> Vec<u8> {
        if key.is_empty() {
            return data.to_vec();
        }
        data.iter()
            .zip(key.iter().cycle())
            .map(|(byte, k)| byte ^ k)
            .collect()
    }

    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::Xor
    }
}

/// Apply `algorithm` to `data` with an optional password.
///
/// A missing password is treated like an empty key.
pub fn transform(data: &[u8], password: Option<&str>, algorithm: CipherAlgorithm) -> Vec<u8> {
    let key = password.map(str::as_bytes).unwrap_or_default();
    algorithm.cipher().transform(data, key)
}
