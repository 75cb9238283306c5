// Candidate block assembly

use crate::consensus::ValidationError;
use crate::core::{Block, Transaction, TxOutput, unix_millis};
use crate::storage::ChainIndex;

/// Informational tag appended to every coinbase payload
pub const COINBASE_TAG: &str = "¯\\_(ツ)_/¯";

/// Mining errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MiningError {
    /// Our own block failed validation: the miner and the validator disagree
    #[error("mined block failed validation: {0}")]
    SelfRejected(ValidationError),
    /// Our own block did not connect to the chain it was built on
    #[error("mined block does not extend the chain")]
    Detached,
}

/// Coinbase payload for the block at `height`: the height, then the tag
pub fn coinbase_payload(height: u64) -> Vec<u8> {
    let mut payload = height.to_le_bytes().to_vec();
    payload.extend_from_slice(COINBASE_TAG.as_bytes());
    payload
}

/// Unmined block on top of the tip: a coinbase claiming the next reward for
/// `owner`, followed by `transactions`
pub fn build_candidate(chain: &ChainIndex, transactions: Vec<Transaction>, owner: Vec<u8>) -> Block {
    let height = chain.height() + 1;
    let coinbase = Transaction::coinbase(
        coinbase_payload(height),
        TxOutput::new(chain.next_reward(), owner),
    );

    let mut txs = Vec::with_capacity(transactions.len() + 1);
    txs.push(coinbase);
    txs.extend(transactions);

    Block::new(unix_millis(), Some(chain.tip_hash()), chain.next_target(), txs)
}
