use crate::config::HonestyMode;
use std::collections::HashMap;

/// What this node believes about one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewEntry {
    /// numID of the most recent block the owner was seen chained to
    pub last_block: Option<u64>,
    pub mode: Option<HonestyMode>,
    pub balance: Option<i64>,
}

/// Local, best-effort view of every owner this node has observed.
///
/// Never authoritative: it is refreshed by walking the overlay and seeded
/// lazily on first observation.
#[derive(Debug, Default)]
pub struct ViewTable {
    entries: HashMap<u64, ViewEntry>,
}

impl ViewTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: u64) -> Option<&ViewEntry> {
        self.entries.get(&owner)
    }

    pub fn last_block(&self, owner: u64) -> Option<u64> {
        self.entries.get(&owner).and_then(|e| e.last_block)
    }

    pub fn record_last_block(&mut self, owner: u64, block: u64) {
        self.entries.entry(owner).or_default().last_block = Some(block);
    }

    /// Seeds the owner's last block unless one is known; returns the
    /// previously known block, `None` on first observation.
    pub fn seed_last_block(&mut self, owner: u64, block: u64) -> Option<u64> {
        let entry = self.entries.entry(owner).or_default();
        match entry.last_block {
            Some(known) => Some(known),
            None => {
                entry.last_block = Some(block);
                None
            }
        }
    }

    pub fn mode(&self, owner: u64) -> Option<HonestyMode> {
        self.entries.get(&owner).and_then(|e| e.mode)
    }

    pub fn record_mode(&mut self, owner: u64, mode: HonestyMode) {
        self.entries.entry(owner).or_default().mode = Some(mode);
    }

    /// Known balance of the owner, or `None` after seeding it with `initial`.
    pub fn balance_or_seed(&mut self, owner: u64, initial: i64) -> Option<i64> {
        let entry = self.entries.entry(owner).or_default();
        match entry.balance {
            Some(balance) => Some(balance),
            None => {
                entry.balance = Some(initial);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
