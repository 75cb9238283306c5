// Key management

use crate::core::{Hash256, ParseError, signature};
use rand::rngs::OsRng;
use secp256k1::SecretKey;
use std::fmt;

/// Key pair; the owner key written into outputs is the uncompressed public key
#[derive(Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    owner: Vec<u8>,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let owner = signature::public_key_bytes(&secret_key);
        Self { secret_key, owner }
    }

    /// Create from secret key bytes
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, ParseError> {
        let secret_key =
            SecretKey::from_slice(bytes).map_err(|e| ParseError::Key(e.to_string()))?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Create from a 64-digit hex private key
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ParseError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| ParseError::Hex(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseError::Length {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_secret_bytes(&bytes)
    }

    /// Public key bytes that outputs paying this key carry
    pub fn owner(&self) -> Vec<u8> {
        self.owner.clone()
    }

    pub fn owner_bytes(&self) -> &[u8] {
        &self.owner
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.owner)
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// DER signature over `digest`
    pub fn sign(&self, digest: &Hash256) -> Vec<u8> {
        signature::sign(digest, &self.secret_key)
    }
}

// keep the secret out of logs
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("owner", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash256;

    #[test]
    fn test_generate_keypair() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        assert_eq!(a.owner_bytes().len(), 65);
        assert_ne!(a.owner(), b.owner());
    }

    #[test]
    fn test_hex_round_trip() {
        let key = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&key.secret_key_hex()).unwrap();
        assert_eq!(restored.owner(), key.owner());
    }

    #[test]
    fn test_known_public_key() {
        // secret key 1 maps to the curve generator point
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = KeyPair::from_secret_bytes(&secret).unwrap();
        assert!(key.public_key_hex().starts_with(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        ));
    }

    #[test]
    fn test_invalid_secret() {
        assert!(matches!(
            KeyPair::from_secret_hex("zz"),
            Err(ParseError::Hex(_))
        ));
        assert!(matches!(
            KeyPair::from_secret_hex("abcd"),
            Err(ParseError::Length { expected: 32, actual: 2 })
        ));
        assert!(matches!(
            KeyPair::from_secret_bytes(&[0; 32]),
            Err(ParseError::Key(_))
        ));
    }

    #[test]
    fn test_sign_verifies_against_owner() {
        let key = KeyPair::from_secret_bytes(&[4; 32]).unwrap();
        let digest = hash256(b"message");
        assert!(signature::verify(&digest, key.owner_bytes(), &key.sign(&digest)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = KeyPair::from_secret_bytes(&[4; 32]).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains(&key.secret_key_hex()));
    }
}
