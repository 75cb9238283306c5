// Basic types for the chain

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors raised while parsing text forms of hashes, targets, outpoints and keys
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("invalid length: expected {expected}, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid outpoint: {0}")]
    OutPoint(String),
    #[error("invalid key: {0}")]
    Key(String),
}

/// 256-bit hash type (32 bytes)
/// Used for block hashes and transaction IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create a new Hash256 from a byte array
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a Hash256 from a slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, ParseError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| ParseError::Length {
            expected: 32,
            actual: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex text, most significant byte first
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ParseError> {
        let bytes = hex::decode(hex_str).map_err(|e| ParseError::Hex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Proof-of-work threshold: an unsigned 256-bit integer stored big-endian.
///
/// Byte-wise ordering of big-endian arrays is numeric ordering, so the derived
/// `Ord` compares targets (and hashes) as integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target([u8; 32]);

impl Target {
    pub const MAX: Target = Target([0xff; 32]);

    pub const fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Parse canonical hex text. Shorter inputs are treated as having leading zeros.
    pub fn from_hex(hex_str: &str) -> Result<Self, ParseError> {
        let digits = hex_str.trim_start_matches("0x");
        if digits.len() > 64 {
            return Err(ParseError::Length {
                expected: 64,
                actual: digits.len(),
            });
        }
        let padded = format!("{:0>64}", digits);
        let bytes = hex::decode(padded).map_err(|e| ParseError::Hex(e.to_string()))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Canonical hex text: 64 lowercase digits
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// A hash meets the target iff, read as a big-endian integer, it is strictly smaller
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        hash.0 < self.0
    }

    /// `self * numerator / denominator` with truncating division, saturating at `MAX`.
    pub fn scale(&self, numerator: u64, denominator: u64) -> Target {
        if denominator == 0 {
            return Target::MAX;
        }

        // little-endian limbs, one extra limb for the product
        let mut limbs = [0u64; 5];
        for (i, limb) in limbs.iter_mut().take(4).enumerate() {
            let start = 32 - (i + 1) * 8;
            let mut word = [0u8; 8];
            word.copy_from_slice(&self.0[start..start + 8]);
            *limb = u64::from_be_bytes(word);
        }

        let mut carry = 0u128;
        for limb in limbs.iter_mut() {
            let product = (*limb as u128) * (numerator as u128) + carry;
            *limb = product as u64;
            carry = product >> 64;
        }

        let mut remainder = 0u128;
        for limb in limbs.iter_mut().rev() {
            let current = (remainder << 64) | (*limb as u128);
            *limb = (current / denominator as u128) as u64;
            remainder = current % denominator as u128;
        }

        if limbs[4] != 0 {
            return Target::MAX;
        }

        let mut out = [0u8; 32];
        for (i, limb) in limbs.iter().take(4).enumerate() {
            let start = 32 - (i + 1) * 8;
            out[start..start + 8].copy_from_slice(&limb.to_be_bytes());
        }
        Target(out)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Target {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

macro_rules! serde_via_text {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use serde_via_text;

serde_via_text!(Hash256);
serde_via_text!(Target);

/// Milliseconds since the Unix epoch
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
