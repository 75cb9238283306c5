// Transaction and block validation

use crate::consensus::pow::proof_of_work_valid;
use crate::core::{Block, Hash256, OutPoint, Target, Transaction, TxInput, signature};
use crate::storage::UtxoSet;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Input references an output missing from the ledger snapshot
    #[error("unknown output {0}")]
    UnknownOutput(OutPoint),
    /// Coinbase-style input found outside the coinbase position
    #[error("input {0} has no outpoint")]
    MissingOutPoint(usize),
    /// Signature missing or not made by the output's owner
    #[error("bad signature on input {0}")]
    BadSignature(usize),
    /// Outputs exceed inputs
    #[error("outputs spend {spent} but inputs provide only {received}")]
    Overspend { spent: u128, received: u128 },
    /// Non-genesis block without a previous block
    #[error("block {0} does not extend any chain")]
    Detached(Hash256),
    /// Block hash doesn't meet the required target
    #[error("block {0} has insufficient proof of work")]
    InsufficientWork(Hash256),
    /// Block carries no transactions, so no coinbase either
    #[error("block has no coinbase transaction")]
    MissingCoinbase,
    /// Coinbase pays more than the block reward
    #[error("coinbase pays {paid}, more than the allowed {allowed}")]
    BadCoinbase { paid: u128, allowed: u64 },
    /// A non-coinbase transaction of the block failed validation
    #[error("transaction {index} is invalid: {reason}")]
    BadTransaction {
        index: usize,
        reason: Box<ValidationError>,
    },
}

/// Decide whether `tx` is admissible against `utxos`.
///
/// With `coinbase_cap` set the transaction is treated as a coinbase: only the
/// output total is checked against the cap, inputs are not looked up.
/// Otherwise every input must reference a known output and carry its owner's
/// signature over the signature-stripped transaction. Any surplus of inputs
/// over outputs is an (unclaimed) fee.
///
/// Inputs are not checked for duplicates: an outpoint listed twice is counted
/// twice towards the input total. Rejecting it would change which blocks are
/// valid, so peers on the existing chain would split off.
pub fn validate_transaction(
    tx: &Transaction,
    utxos: &UtxoSet,
    coinbase_cap: Option<u64>,
) -> Result<(), ValidationError> {
    let spent = tx.total_output_value();

    if let Some(allowed) = coinbase_cap {
        if spent > allowed as u128 {
            return Err(ValidationError::BadCoinbase {
                paid: spent,
                allowed,
            });
        }
        return Ok(());
    }

    // every input signs the same digest
    let digest = tx.signature_hash();
    let mut received = 0u128;

    for (index, input) in tx.inputs.iter().enumerate() {
        let TxInput::Spend {
            outpoint,
            script_sig,
        } = input
        else {
            return Err(ValidationError::MissingOutPoint(index));
        };

        let utxo = utxos
            .get(outpoint)
            .ok_or(ValidationError::UnknownOutput(*outpoint))?;

        let signed = script_sig
            .as_deref()
            .is_some_and(|sig| signature::verify(&digest, &utxo.owner, sig));
        if !signed {
            return Err(ValidationError::BadSignature(index));
        }

        received += utxo.value as u128;
    }

    if received < spent {
        return Err(ValidationError::Overspend { spent, received });
    }

    Ok(())
}

/// Decide whether `block` may extend a chain whose ledger is `utxos`.
///
/// All transactions are checked against the pre-block snapshot, so they cannot
/// spend each other's outputs.
pub fn validate_block(
    block: &Block,
    utxos: &UtxoSet,
    target: &Target,
    reward: u64,
) -> Result<(), ValidationError> {
    let hash = block.hash();
    if !proof_of_work_valid(&hash, target) {
        return Err(ValidationError::InsufficientWork(hash));
    }

    let coinbase = block.coinbase().ok_or(ValidationError::MissingCoinbase)?;
    validate_transaction(coinbase, utxos, Some(reward))?;

    for (index, tx) in block.transactions.iter().enumerate().skip(1) {
        validate_transaction(tx, utxos, None).map_err(|reason| {
            ValidationError::BadTransaction {
                index,
                reason: Box::new(reason),
            }
        })?;
    }

    Ok(())
}

/// Apply an already-validated block: for each transaction in order, remove the
/// outputs it consumes, then add the outputs it creates.
///
/// Every `Spend` input removes its outpoint without a check, including one
/// carried by a coinbase, whose inputs validation never looks at. This is
/// consensus behaviour and must stay as is for existing chains to replay.
pub fn apply_block(block: &Block, utxos: &mut UtxoSet) {
    for tx in &block.transactions {
        let txid = tx.txid();
        for outpoint in tx.inputs.iter().filter_map(TxInput::outpoint) {
            utxos.remove(outpoint);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            utxos.insert(OutPoint::new(txid, index as u32), output.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::pow::Miner;
    use crate::core::TxOutput;
    use crate::wallet::KeyPair;

    fn keypair(byte: u8) -> KeyPair {
        KeyPair::from_secret_bytes(&[byte; 32]).unwrap()
    }

    /// Ledger holding a single output of `value` owned by `owner`
    fn funded(owner: &KeyPair, value: u64) -> (UtxoSet, OutPoint) {
        let mut utxos = UtxoSet::new();
        let outpoint = OutPoint::new(Hash256::new([1; 32]), 0);
        utxos.insert(outpoint, TxOutput::new(value, owner.owner()));
        (utxos, outpoint)
    }

    fn signed_spend(owner: &KeyPair, outpoint: OutPoint, outputs: Vec<TxOutput>) -> Transaction {
        let mut tx = Transaction::new(vec![TxInput::spend(outpoint)], outputs);
        let sig = owner.sign(&tx.signature_hash());
        if let TxInput::Spend { script_sig, .. } = &mut tx.inputs[0] {
            *script_sig = Some(sig);
        }
        tx
    }

    fn mined(transactions: Vec<Transaction>) -> Block {
        let mut block = Block::new(0, None, Target::MAX, transactions);
        Miner::new(1).mine(&mut block);
        block
    }

    #[test]
    fn test_valid_spend_with_fee() {
        let alice = keypair(1);
        let (utxos, outpoint) = funded(&alice, 100);
        let tx = signed_spend(&alice, outpoint, vec![TxOutput::new(90, keypair(2).owner())]);
        assert_eq!(validate_transaction(&tx, &utxos, None), Ok(()));
    }

    #[test]
    fn test_unknown_output() {
        let alice = keypair(1);
        let (utxos, _) = funded(&alice, 100);
        let missing = OutPoint::new(Hash256::new([2; 32]), 0);
        let tx = signed_spend(&alice, missing, vec![TxOutput::new(1, alice.owner())]);
        assert_eq!(
            validate_transaction(&tx, &utxos, None),
            Err(ValidationError::UnknownOutput(missing))
        );
    }

    #[test]
    fn test_bad_signature() {
        let alice = keypair(1);
        let (utxos, outpoint) = funded(&alice, 100);

        let forged = signed_spend(&keypair(3), outpoint, vec![TxOutput::new(1, alice.owner())]);
        assert_eq!(
            validate_transaction(&forged, &utxos, None),
            Err(ValidationError::BadSignature(0))
        );

        let unsigned = signed_spend(&alice, outpoint, vec![TxOutput::new(1, alice.owner())]).stripped();
        assert_eq!(
            validate_transaction(&unsigned, &utxos, None),
            Err(ValidationError::BadSignature(0))
        );
    }

    #[test]
    fn test_tampered_output_breaks_signature() {
        let alice = keypair(1);
        let (utxos, outpoint) = funded(&alice, 100);
        let mut tx = signed_spend(&alice, outpoint, vec![TxOutput::new(10, alice.owner())]);
        tx.outputs[0].owner = keypair(2).owner();
        assert_eq!(
            validate_transaction(&tx, &utxos, None),
            Err(ValidationError::BadSignature(0))
        );
    }

    #[test]
    fn test_overspend() {
        let alice = keypair(1);
        let (utxos, outpoint) = funded(&alice, 100);
        let tx = signed_spend(&alice, outpoint, vec![TxOutput::new(101, alice.owner())]);
        assert_eq!(
            validate_transaction(&tx, &utxos, None),
            Err(ValidationError::Overspend { spent: 101, received: 100 })
        );
    }

    #[test]
    fn test_coinbase_input_outside_coinbase_position() {
        let utxos = UtxoSet::new();
        let tx = Transaction::coinbase(vec![1], TxOutput::new(1, vec![]));
        assert_eq!(
            validate_transaction(&tx, &utxos, None),
            Err(ValidationError::MissingOutPoint(0))
        );
    }

    #[test]
    fn test_coinbase_cap() {
        let utxos = UtxoSet::new();
        let tx = Transaction::coinbase(vec![1], TxOutput::new(50, vec![]));
        assert_eq!(validate_transaction(&tx, &utxos, Some(50)), Ok(()));
        assert_eq!(
            validate_transaction(&tx, &utxos, Some(49)),
            Err(ValidationError::BadCoinbase { paid: 50, allowed: 49 })
        );
    }

    #[test]
    fn test_validate_block_pow() {
        let coinbase = Transaction::coinbase(vec![1], TxOutput::new(50, vec![]));
        let block = Block::new(0, None, Target::MAX, vec![coinbase]);
        let impossible = Target::from_be_bytes([0u8; 32]);
        assert_eq!(
            validate_block(&block, &UtxoSet::new(), &impossible, 50),
            Err(ValidationError::InsufficientWork(block.hash()))
        );
    }

    #[test]
    fn test_validate_block_checks_coinbase_and_rest() {
        let alice = keypair(1);
        let (utxos, outpoint) = funded(&alice, 100);
        let coinbase = Transaction::coinbase(vec![1], TxOutput::new(50, alice.owner()));
        let good = signed_spend(&alice, outpoint, vec![TxOutput::new(100, alice.owner())]);
        let bad = signed_spend(&alice, outpoint, vec![TxOutput::new(500, alice.owner())]);

        let block = mined(vec![coinbase.clone(), good.clone()]);
        assert_eq!(validate_block(&block, &utxos, &Target::MAX, 50), Ok(()));
        assert_eq!(
            validate_block(&block, &utxos, &Target::MAX, 49),
            Err(ValidationError::BadCoinbase { paid: 50, allowed: 49 })
        );

        let block = mined(vec![coinbase, good, bad]);
        assert!(matches!(
            validate_block(&block, &utxos, &Target::MAX, 50),
            Err(ValidationError::BadTransaction { index: 2, .. })
        ));

        let empty = mined(vec![]);
        assert_eq!(
            validate_block(&empty, &utxos, &Target::MAX, 50),
            Err(ValidationError::MissingCoinbase)
        );
    }

    #[test]
    fn test_transactions_cannot_spend_same_block_outputs() {
        let alice = keypair(1);
        let (utxos, outpoint) = funded(&alice, 100);
        let coinbase = Transaction::coinbase(vec![1], TxOutput::new(50, alice.owner()));
        let first = signed_spend(&alice, outpoint, vec![TxOutput::new(100, alice.owner())]);
        let second = signed_spend(
            &alice,
            OutPoint::new(first.txid(), 0),
            vec![TxOutput::new(100, alice.owner())],
        );

        let block = mined(vec![coinbase, first, second]);
        assert!(matches!(
            validate_block(&block, &utxos, &Target::MAX, 50),
            Err(ValidationError::BadTransaction { index: 2, .. })
        ));
    }

    #[test]
    fn test_apply_block() {
        let alice = keypair(1);
        let bob = keypair(2);
        let (mut utxos, outpoint) = funded(&alice, 100);
        let coinbase = Transaction::coinbase(vec![1], TxOutput::new(50, alice.owner()));
        let spend = signed_spend(
            &alice,
            outpoint,
            vec![TxOutput::new(60, bob.owner()), TxOutput::new(40, alice.owner())],
        );
        let block = mined(vec![coinbase.clone(), spend.clone()]);

        apply_block(&block, &mut utxos);

        assert_eq!(utxos.len(), 3);
        assert!(utxos.get(&outpoint).is_none());
        assert_eq!(utxos.get(&OutPoint::new(coinbase.txid(), 0)).unwrap().value, 50);
        assert_eq!(utxos.get(&OutPoint::new(spend.txid(), 0)).unwrap().value, 60);
        assert_eq!(utxos.get(&OutPoint::new(spend.txid(), 1)).unwrap().value, 40);
        assert_eq!(utxos.balance(&bob.owner()), 60);
        assert_eq!(utxos.balance(&alice.owner()), 90);
    }
}
