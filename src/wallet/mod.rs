// Wallet: keys and transfer construction

mod keypair;
mod tx_builder;

pub use keypair::KeyPair;
pub use tx_builder::{TransactionBuilder, WalletError};
