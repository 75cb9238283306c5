// Known peer addresses with their last-seen times

use crate::network::AddrEntry;
use std::collections::BTreeMap;
use std::time::Duration;

/// Peer addresses used to pick reconnection candidates
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: BTreeMap<String, u64>,
    /// Fixed peer list: learned addresses are ignored
    fixed: bool,
}

impl AddressBook {
    /// Book holding `addresses`, all considered seen at `now`
    pub fn new(addresses: impl IntoIterator<Item = String>, now: u64, fixed: bool) -> Self {
        Self {
            entries: addresses.into_iter().map(|address| (address, now)).collect(),
            fixed,
        }
    }

    /// Record `address` as seen at `time`; the most recent sighting wins
    pub fn learn(&mut self, address: String, time: u64) -> bool {
        if self.fixed {
            return false;
        }
        let seen = self.entries.entry(address).or_insert(time);
        *seen = (*seen).max(time);
        true
    }

    pub fn last_seen(&self, address: &str) -> Option<u64> {
        self.entries.get(address).copied()
    }

    /// Entries as gossiped in `addr`
    pub fn entries(&self) -> Vec<AddrEntry> {
        self.entries
            .iter()
            .map(|(address, time)| AddrEntry {
                address: address.clone(),
                time: *time,
            })
            .collect()
    }

    /// Addresses seen within `staleness` of `now`
    pub fn fresh(&self, now: u64, staleness: Duration) -> impl Iterator<Item = &str> {
        let window = staleness.as_millis() as u64;
        self.entries
            .iter()
            .filter(move |(_, time)| now.saturating_sub(**time) < window)
            .map(|(address, _)| address.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
