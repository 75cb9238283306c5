// Hashing utilities

use crate::core::{Encodable, Hash256};
use sha2::{Digest, Sha256};

/// SHA256 double hash
/// hash256 = SHA256(SHA256(data))
pub fn hash256(data: &[u8]) -> Hash256 {
    let first_hash = Sha256::digest(data);
    let second_hash = Sha256::digest(first_hash);
    Hash256::new(second_hash.into())
}

/// Double hash of the canonical encoding of `item`
pub fn hash_of<T: Encodable + ?Sized>(item: &T) -> Hash256 {
    hash256(&item.encoded())
}
