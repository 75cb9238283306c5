// Transaction pool: unconfirmed transactions valid against the best chain

use crate::consensus::{ValidationError, validate_transaction};
use crate::core::{Block, Hash256, Transaction};
use crate::storage::UtxoSet;
use std::collections::HashMap;

/// Result of submitting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted(Hash256),
    /// Already pooled; nothing changed
    Duplicate,
}

/// Unconfirmed transactions, kept in arrival order.
///
/// Entries are only checked against the ledger, never against each other:
/// two pooled transactions may spend the same output until one is mined.
#[derive(Debug, Default)]
pub struct Mempool {
    transactions: HashMap<Hash256, Transaction>,
    order: Vec<Hash256>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `tx` against `utxos` and pool it
    pub fn submit(
        &mut self,
        tx: Transaction,
        utxos: &UtxoSet,
    ) -> Result<Admission, ValidationError> {
        let txid = tx.txid();
        if self.transactions.contains_key(&txid) {
            return Ok(Admission::Duplicate);
        }

        validate_transaction(&tx, utxos, None)?;

        self.transactions.insert(txid, tx);
        self.order.push(txid);
        Ok(Admission::Accepted(txid))
    }

    /// Drop every entry no longer valid against `utxos`, returning how many
    /// were dropped
    pub fn purge(&mut self, utxos: &UtxoSet) -> usize {
        let before = self.order.len();
        let transactions = &mut self.transactions;
        self.order.retain(|txid| {
            let valid = transactions
                .get(txid)
                .is_some_and(|tx| validate_transaction(tx, utxos, None).is_ok());
            if !valid {
                transactions.remove(txid);
            }
            valid
        });
        before - self.order.len()
    }

    /// Drop the entries `block` confirms, returning how many were dropped.
    ///
    /// A confirmed transaction can still validate against the new ledger (one
    /// with no inputs, for instance), so `purge` alone would keep it.
    pub fn remove_confirmed(&mut self, block: &Block) -> usize {
        let mut removed = 0;
        for tx in &block.transactions {
            if self.transactions.remove(&tx.txid()).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            let transactions = &self.transactions;
            self.order.retain(|txid| transactions.contains_key(txid));
        }
        removed
    }

    /// Copy of the pooled transactions in arrival order
    pub fn transactions(&self) -> Vec<Transaction> {
        self.order
            .iter()
            .filter_map(|txid| self.transactions.get(txid))
            .cloned()
            .collect()
    }

    pub fn get(&self, txid: &Hash256) -> Option<&Transaction> {
        self.transactions.get(txid)
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.transactions.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
