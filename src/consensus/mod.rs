// Consensus and validation logic

pub mod params;
pub mod pow;
pub mod validation;

pub use params::ChainParams;
pub use pow::{Miner, MiningResult, proof_of_work_valid};
pub use validation::{ValidationError, apply_block, validate_block, validate_transaction};
