// UTXO (Unspent Transaction Output) set management

use crate::core::{OutPoint, TxOutput};
use im::OrdMap;

/// Persistent UTXO snapshot.
///
/// Cloning is O(1) and an update copies only the O(log n) tree nodes on the
/// path to the changed key; everything else stays shared with the snapshot it
/// was cloned from. Each chain node keeps the snapshot in force after its
/// block, so siblings never see each other's spends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtxoSet {
    outputs: OrdMap<OutPoint, TxOutput>,
}

impl UtxoSet {
    /// Create an empty UTXO set
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a UTXO
    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.outputs.get(outpoint)
    }

    /// Check if a UTXO exists
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.outputs.contains_key(outpoint)
    }

    /// Add a UTXO, replacing any previous output at the same outpoint
    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        self.outputs.insert(outpoint, output);
    }

    /// Remove a UTXO (spent)
    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        // a miss would still unshare the root
        if !self.outputs.contains_key(outpoint) {
            return None;
        }
        self.outputs.remove(outpoint)
    }

    /// Count total UTXOs
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Iterate in outpoint order
    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &TxOutput)> {
        self.outputs.iter()
    }

    /// Get all UTXOs owned by `owner`
    pub fn unspent_for<'a>(
        &'a self,
        owner: &'a [u8],
    ) -> impl Iterator<Item = (&'a OutPoint, &'a TxOutput)> + 'a {
        self.outputs
            .iter()
            .filter(move |(_, output)| output.owner == owner)
    }

    /// Get balance for an owner
    pub fn balance(&self, owner: &[u8]) -> u64 {
        self.unspent_for(owner)
            .fold(0u64, |sum, (_, output)| sum.saturating_add(output.value))
    }

    /// Whether two snapshots share their root (neither has changed since cloning)
    pub fn shares_storage_with(&self, other: &UtxoSet) -> bool {
        self.outputs.ptr_eq(&other.outputs)
    }
}
