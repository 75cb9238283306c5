// Transaction builder

use crate::consensus::ValidationError;
use crate::core::{OutPoint, Transaction, TxInput, TxOutput};
use crate::storage::UtxoSet;
use crate::wallet::KeyPair;

/// Wallet errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("transfer amount must be positive")]
    ZeroAmount,
    #[error("insufficient funds: have {available}, need {requested}")]
    InsufficientFunds { available: u64, requested: u64 },
    /// Selected output is not owned by the signing key
    #[error("output {0} is not owned by this wallet")]
    UnknownOwner(OutPoint),
    /// The built transaction did not validate against our own ledger
    #[error("transfer rejected: {0}")]
    Rejected(ValidationError),
}

/// Builds signed transfers out of the outputs a key owns in one snapshot
pub struct TransactionBuilder<'a> {
    keypair: &'a KeyPair,
    utxo_set: &'a UtxoSet,
}

impl<'a> TransactionBuilder<'a> {
    /// Create a new transaction builder
    pub fn new(keypair: &'a KeyPair, utxo_set: &'a UtxoSet) -> Self {
        Self { keypair, utxo_set }
    }

    /// Build a transaction paying `amount` to `recipient`.
    ///
    /// Outputs are picked in snapshot order until they cover the amount; any
    /// excess comes back as a second, change output. Every input is signed
    /// over the signature-stripped transaction.
    pub fn build(&self, recipient: Vec<u8>, amount: u64) -> Result<Transaction, WalletError> {
        if amount == 0 {
            return Err(WalletError::ZeroAmount);
        }
        let (selected, total_input) = self.select_utxos(amount)?;

        let inputs = selected.iter().map(|outpoint| TxInput::spend(*outpoint)).collect();
        let mut outputs = vec![TxOutput::new(amount, recipient)];

        let change = total_input - amount;
        if change > 0 {
            outputs.push(TxOutput::new(change, self.keypair.owner()));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.sign_transaction(&mut tx)?;
        Ok(tx)
    }

    /// Select UTXOs to cover amount
    fn select_utxos(&self, target: u64) -> Result<(Vec<OutPoint>, u64), WalletError> {
        let mut selected = Vec::new();
        let mut total = 0u64;

        for (outpoint, output) in self.utxo_set.unspent_for(self.keypair.owner_bytes()) {
            selected.push(*outpoint);
            total = total.saturating_add(output.value);

            if total >= target {
                return Ok((selected, total));
            }
        }

        if total >= target {
            return Ok((selected, total));
        }
        Err(WalletError::InsufficientFunds {
            available: total,
            requested: target,
        })
    }

    /// Sign transaction inputs
    fn sign_transaction(&self, tx: &mut Transaction) -> Result<(), WalletError> {
        let digest = tx.signature_hash();

        for input in &mut tx.inputs {
            let TxInput::Spend {
                outpoint,
                script_sig,
            } = input
            else {
                continue;
            };
            let owned = self
                .utxo_set
                .get(outpoint)
                .is_some_and(|output| output.owner == self.keypair.owner_bytes());
            if !owned {
                return Err(WalletError::UnknownOwner(*outpoint));
            }
            *script_sig = Some(self.keypair.sign(&digest));
        }

        Ok(())
    }

    /// Get balance for the wallet key
    pub fn balance(&self) -> u64 {
        self.utxo_set.balance(self.keypair.owner_bytes())
    }

    /// List UTXOs for the wallet key
    pub fn unspent_outputs(&self) -> Vec<(OutPoint, TxOutput)> {
        self.utxo_set
            .unspent_for(self.keypair.owner_bytes())
            .map(|(outpoint, output)| (*outpoint, output.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::validate_transaction;
    use crate::core::Hash256;

    fn setup(values: &[u64]) -> (KeyPair, UtxoSet) {
        let keypair = KeyPair::from_secret_bytes(&[1; 32]).unwrap();
        let mut utxo_set = UtxoSet::new();
        for (i, value) in values.iter().enumerate() {
            utxo_set.insert(
                OutPoint::new(Hash256::new([i as u8 + 1; 32]), 0),
                TxOutput::new(*value, keypair.owner()),
            );
        }
        (keypair, utxo_set)
    }

    #[test]
    fn test_build_with_change() {
        let (keypair, utxo_set) = setup(&[30, 30, 30]);
        let builder = TransactionBuilder::new(&keypair, &utxo_set);

        let tx = builder.build(vec![9], 50).unwrap();

        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(
            tx.outputs,
            vec![TxOutput::new(50, vec![9]), TxOutput::new(10, keypair.owner())]
        );
        assert_eq!(validate_transaction(&tx, &utxo_set, None), Ok(()));
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let (keypair, utxo_set) = setup(&[30, 30]);
        let tx = TransactionBuilder::new(&keypair, &utxo_set)
            .build(vec![9], 60)
            .unwrap();

        assert_eq!(tx.outputs, vec![TxOutput::new(60, vec![9])]);
        assert_eq!(validate_transaction(&tx, &utxo_set, None), Ok(()));
    }

    #[test]
    fn test_insufficient_funds() {
        let (keypair, utxo_set) = setup(&[30, 30]);
        let result = TransactionBuilder::new(&keypair, &utxo_set).build(vec![9], 61);

        assert_eq!(
            result,
            Err(WalletError::InsufficientFunds {
                available: 60,
                requested: 61
            })
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        let (keypair, utxo_set) = setup(&[30]);
        assert_eq!(
            TransactionBuilder::new(&keypair, &utxo_set).build(vec![9], 0),
            Err(WalletError::ZeroAmount)
        );

        // without funds a zero transfer would otherwise have no inputs at all
        let empty = UtxoSet::new();
        assert_eq!(
            TransactionBuilder::new(&keypair, &empty).build(vec![9], 0),
            Err(WalletError::ZeroAmount)
        );
    }

    #[test]
    fn test_only_own_outputs_are_spent() {
        let (keypair, mut utxo_set) = setup(&[10]);
        let foreign = OutPoint::new(Hash256::new([0xaa; 32]), 0);
        utxo_set.insert(foreign, TxOutput::new(1_000, vec![3]));

        let builder = TransactionBuilder::new(&keypair, &utxo_set);
        assert_eq!(builder.balance(), 10);
        assert_eq!(builder.unspent_outputs().len(), 1);
        assert!(matches!(
            builder.build(vec![9], 11),
            Err(WalletError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_signatures_cover_stripped_transaction() {
        let (keypair, utxo_set) = setup(&[5, 5]);
        let tx = TransactionBuilder::new(&keypair, &utxo_set)
            .build(vec![9], 8)
            .unwrap();

        let digest = tx.stripped().txid();
        for input in &tx.inputs {
            let sig = input.script_sig().unwrap();
            assert!(crate::core::signature::verify(&digest, keypair.owner_bytes(), sig));
        }
    }
}
