// Block data structures

use crate::core::serialize::write_varint;
use crate::core::{Encodable, Hash256, Target, Transaction, hash_of};
use serde::{Deserialize, Serialize};

/// Block - proof-of-work header fields plus the full transaction list.
///
/// Identity covers the whole structure, transactions included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Milliseconds since the Unix epoch, refreshed on every mining attempt
    pub time: u64,
    /// Nonce for proof-of-work
    pub nonce: u64,
    /// Hash of the previous block; `None` only for a chain root
    pub previous_hash: Option<Hash256>,
    /// Difficulty target this block must meet
    pub target: Target,
    /// First transaction is the coinbase
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        time: u64,
        previous_hash: Option<Hash256>,
        target: Target,
        transactions: Vec<Transaction>,
    ) -> Self {
        Self {
            time,
            nonce: 0,
            previous_hash,
            target,
            transactions,
        }
    }

    /// Block ID (double SHA256 of the canonical encoding)
    pub fn hash(&self) -> Hash256 {
        hash_of(self)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Check if this block starts a chain
    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }
}

impl Encodable for Block {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        match &self.previous_hash {
            Some(hash) => {
                buf.push(1);
                buf.extend_from_slice(hash.as_bytes());
            }
            None => buf.push(0),
        }
        buf.extend_from_slice(&self.target.to_be_bytes());
        write_varint(buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode(buf);
        }
    }
}
