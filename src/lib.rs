// Minimal proof-of-work blockchain node
// UTXO ledger, longest-chain consensus and block/transaction gossip

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod mempool;
pub mod miner;
pub mod network;
pub mod storage;
pub mod wallet;

// Re-exports for convenience
pub use cli::{Cli, CliHandler};
pub use config::NodeConfig;
pub use consensus::{ChainParams, Miner, ValidationError};
pub use core::{Block, Hash256, OutPoint, Target, Transaction, TxInput, TxOutput};
pub use mempool::Mempool;
pub use network::{MemoryNetwork, Message, Node, RuntimeHandle};
pub use storage::{AddBlockOutcome, ChainIndex, UtxoSet};
pub use wallet::{KeyPair, WalletError};
