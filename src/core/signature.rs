// ECDSA over secp256k1: outputs are bound to a single public key

use crate::core::Hash256;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use std::sync::OnceLock;

fn context() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::<All>::new)
}

/// Sign a 32-byte digest, returning the DER-encoded signature
pub fn sign(digest: &Hash256, secret_key: &SecretKey) -> Vec<u8> {
    let message = Message::from_digest(*digest.as_bytes());
    context()
        .sign_ecdsa(&message, secret_key)
        .serialize_der()
        .to_vec()
}

/// Verify a DER signature over `digest` against a serialized public key.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify(digest: &Hash256, public_key: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = PublicKey::from_slice(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(signature) else {
        return false;
    };
    let message = Message::from_digest(*digest.as_bytes());
    context()
        .verify_ecdsa(&message, &signature, &public_key)
        .is_ok()
}

/// Uncompressed public key for `secret_key`
pub fn public_key_bytes(secret_key: &SecretKey) -> Vec<u8> {
    secret_key
        .public_key(context())
        .serialize_uncompressed()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash256;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let secret = key(7);
        let public = public_key_bytes(&secret);
        let digest = hash256(b"payload");

        let signature = sign(&digest, &secret);
        assert!(verify(&digest, &public, &signature));
        assert!(!verify(&hash256(b"other"), &public, &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let digest = hash256(b"payload");
        let signature = sign(&digest, &key(7));
        assert!(!verify(&digest, &public_key_bytes(&key(8)), &signature));
    }

    #[test]
    fn test_garbage_inputs_fail() {
        let digest = hash256(b"payload");
        let public = public_key_bytes(&key(7));
        assert!(!verify(&digest, &[1, 2, 3], &sign(&digest, &key(7))));
        assert!(!verify(&digest, &public, &[0x30, 0x01]));
    }

    #[test]
    fn test_public_key_is_uncompressed() {
        let public = public_key_bytes(&key(7));
        assert_eq!(public.len(), 65);
        assert_eq!(public[0], 0x04);
    }
}
