use std::collections::{BTreeSet, HashMap};

use super::SlotId;
use crate::error::{FalsifyError, Result};

/// What an acquire has to do with its slot once the lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The owner already holds this slot.
    Held(SlotId),
    /// Previously used slot; must be reset before use.
    Reuse(SlotId),
    /// Fresh id; the workspace must be created.
    Create(SlotId),
}

impl Claim {
    pub fn slot(&self) -> SlotId {
        match self {
            Self::Held(id) | Self::Reuse(id) | Self::Create(id) => *id,
        }
    }
}

/// Slot partition for the pool.
///
/// Every slot is either in `available` or owned in `allocated`, never both.
/// `reserved` counts slots being created outside the lock that are in
/// neither set yet, so capacity checks include them.
#[derive(Debug, Clone)]
pub(crate) struct PoolBook {
    available: BTreeSet<SlotId>,
    allocated: HashMap<String, SlotId>,
    next_index: u32,
    reserved: usize,
    max_size: usize,
}

impl PoolBook {
    pub fn new(max_size: usize) -> Self {
        Self {
            available: BTreeSet::new(),
            allocated: HashMap::new(),
            next_index: 0,
            reserved: 0,
            max_size,
        }
    }

    pub fn restore(
        max_size: usize,
        available: impl IntoIterator<Item = SlotId>,
        allocated: impl IntoIterator<Item = (String, SlotId)>,
        next_index: u32,
    ) -> Self {
        let available: BTreeSet<SlotId> = available.into_iter().collect();
        let mut allocated_map = HashMap::new();
        let mut seen = available.clone();
        for (owner, id) in allocated {
            if seen.insert(id) {
                allocated_map.insert(owner, id);
            }
        }
        let highest = seen.iter().map(|id| id.0 + 1).max().unwrap_or(0);
        Self {
            available,
            allocated: allocated_map,
            next_index: next_index.max(highest),
            reserved: 0,
            max_size,
        }
    }

    pub fn total(&self) -> usize {
        self.available.len() + self.allocated.len()
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    fn has_capacity(&self) -> bool {
        self.total() + self.reserved < self.max_size
    }

    fn next_id(&mut self) -> SlotId {
        let id = SlotId(self.next_index);
        self.next_index += 1;
        id
    }

    /// Assign a slot to `owner`: theirs, else the lowest available, else a new one.
    pub fn claim(&mut self, owner: &str) -> Result<Claim> {
        if let Some(id) = self.allocated.get(owner) {
            return Ok(Claim::Held(*id));
        }
        if let Some(id) = self.available.pop_first() {
            self.allocated.insert(owner.to_string(), id);
            return Ok(Claim::Reuse(id));
        }
        if self.has_capacity() {
            let id = self.next_id();
            self.allocated.insert(owner.to_string(), id);
            return Ok(Claim::Create(id));
        }
        Err(FalsifyError::PoolExhausted {
            allocated: self.allocated.len(),
            max_size: self.max_size,
        })
    }

    /// Return the owner's slot to the available set.
    pub fn release(&mut self, owner: &str) -> Option<SlotId> {
        let id = self.allocated.remove(owner)?;
        self.available.insert(id);
        Some(id)
    }

    /// Forget the owner's slot entirely; its workspace is gone or broken.
    pub fn abandon(&mut self, owner: &str) -> Option<SlotId> {
        self.allocated.remove(owner)
    }

    /// Reserve capacity for a slot created without an owner.
    pub fn reserve(&mut self) -> Option<SlotId> {
        if !self.has_capacity() {
            return None;
        }
        self.reserved += 1;
        Some(self.next_id())
    }

    /// Settle a reservation; `created` slots join the available set.
    pub fn settle(&mut self, id: SlotId, created: bool) {
        self.reserved = self.reserved.saturating_sub(1);
        if created {
            self.available.insert(id);
        }
    }

    /// Remove the highest available slot for destruction.
    pub fn take_available(&mut self) -> Option<SlotId> {
        self.available.pop_last()
    }

    /// Empty the pool, returning every slot that existed.
    pub fn drain(&mut self) -> Vec<SlotId> {
        let mut ids: Vec<SlotId> = self
            .available
            .iter()
            .copied()
            .chain(self.allocated.values().copied())
            .collect();
        ids.sort();
        self.available.clear();
        self.allocated.clear();
        ids
    }

    /// Move every allocation back to the available set.
    pub fn reclaim_all(&mut self) -> usize {
        let count = self.allocated.len();
        for (_, id) in self.allocated.drain() {
            self.available.insert(id);
        }
        count
    }

    pub fn slot_of(&self, owner: &str) -> Option<SlotId> {
        self.allocated.get(owner).copied()
    }

    pub fn available_ids(&self) -> Vec<SlotId> {
        self.available.iter().copied().collect()
    }

    /// Allocations sorted by slot id.
    pub fn allocations(&self) -> Vec<(String, SlotId)> {
        let mut entries: Vec<(String, SlotId)> = self
            .allocated
            .iter()
            .map(|(owner, id)| (owner.clone(), *id))
            .collect();
        entries.sort_by_key(|(_, id)| *id);
        entries
    }

    #[cfg(test)]
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = BTreeSet::new();
        for id in self.available.iter().chain(self.allocated.values()) {
            if !seen.insert(*id) {
                return Err(format!("slot {} appears twice", id));
            }
        }
        if self.total() + self.reserved > self.max_size {
            return Err(format!(
                "{} slots plus {} reserved exceed max {}",
                self.total(),
                self.reserved,
                self.max_size
            ));
        }
        if seen.iter().any(|id| id.0 >= self.next_index) {
            return Err("slot id at or above next index".into());
        }
        Ok(())
    }
}
