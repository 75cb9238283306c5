// Memory-resident ledger state: UTXO snapshots and the block tree

mod chain_index;
mod utxo_set;

pub use chain_index::{AddBlockOutcome, ChainIndex, ChainNode, ChainUpdate};
pub use utxo_set::UtxoSet;
