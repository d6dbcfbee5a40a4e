/// Synchronizers: named ordering policies shared by every block that
/// references them.

use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use strum::{Display, EnumString};
use tracing::debug;

use crate::core::rng::GenRng;

/// Ordering policy of a synchronizer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SyncType {
    /// Independent uniform draw on every call.
    None,
    /// `0..n` in order, wrapping.
    Forward,
    /// `n-1..=0` in order, wrapping.
    Reverse,
    /// Shuffled order, reshuffled on every wrap.
    Deck,
    /// Shuffled once; the same order repeats forever.
    Cdeck,
    /// One randomly chosen index, returned on every call.
    Locked,
    /// Forward, then back down without repeating the turning index.
    Ping,
    /// Reverse, then back up without repeating the turning index.
    Pong,
}

#[derive(Debug, Clone)]
pub struct Synchronizer {
    kind: SyncType,
    slots: Vec<usize>,
    index: usize,
    pinned: bool,
    bounce: bool,
    rng: GenRng,
}

impl Synchronizer {
    pub fn new(kind: SyncType, seed: u64) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            index: 0,
            pinned: false,
            bounce: false,
            rng: GenRng::new(seed),
        }
    }

    pub fn kind(&self) -> SyncType {
        self.kind
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    /// Number of slots, i.e. the item count of the last block that used it.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rewinds the private generator and cursor and refills the slots.
    pub fn reset(&mut self) {
        self.rng.reset();
        self.index = 0;
        self.bounce = false;
        self.fill_slots();
    }

    /// Picks the next item for a block with `count` alternatives, resizing
    /// and refilling the slot array if the count changed.
    pub fn next_item(&mut self, count: usize) -> usize {
        self.resize(count);
        self.step(false)
    }

    /// Refills the slot array if `count` differs from its length.
    pub fn resize(&mut self, count: usize) {
        if count != self.slots.len() {
            self.slots = (0..count).collect();
            self.fill_slots();
        }
    }

    /// Advances the cursor. A pinned synchronizer only moves when `force`
    /// is set; otherwise it keeps returning the current slot.
    pub fn step(&mut self, force: bool) -> usize {
        let len = self.slots.len();
        if len == 0 {
            return 0;
        }
        match self.kind {
            SyncType::Locked => return self.slots[0],
            SyncType::None => return self.rng.gen_range(0..len),
            _ => {}
        }

        if self.index >= len {
            match self.kind {
                SyncType::Deck => {
                    self.scramble_slots();
                    self.index = 0;
                }
                SyncType::Ping | SyncType::Pong => {
                    self.bounce = !self.bounce;
                    self.index = if len > 1 { 1 } else { 0 };
                }
                _ => self.index = 0,
            }
        }

        let slot = if self.bounce {
            len - 1 - self.index
        } else {
            self.index
        };
        if !self.pinned || force {
            self.index += 1;
        }
        self.slots[slot]
    }

    fn fill_slots(&mut self) {
        let len = self.slots.len();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = match self.kind {
                SyncType::Reverse | SyncType::Pong => len - 1 - i,
                _ => i,
            };
        }
        if matches!(
            self.kind,
            SyncType::Locked | SyncType::Deck | SyncType::Cdeck
        ) {
            self.scramble_slots();
        }
    }

    fn scramble_slots(&mut self) {
        let len = self.slots.len();
        match len {
            0 | 1 => {}
            2 => {
                if self.rng.gen_bool(0.5) {
                    self.slots.swap(0, 1);
                }
            }
            _ => {
                for i in 0..len {
                    let mut s = self.rng.gen_range(0..len);
                    while s == i {
                        s = self.rng.gen_range(0..len);
                    }
                    self.slots.swap(i, s);
                }
            }
        }
    }
}

/// Hash of a synchronizer name, mixed into its seed.
pub fn name_hash(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Every synchronizer created during one run, by name.
#[derive(Debug, Default)]
pub struct SyncManager {
    syncs: FxHashMap<String, Synchronizer>,
    /// Pins requested before the synchronizer existed.
    queued_pins: FxHashSet<String>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Synchronizer> {
        self.syncs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Synchronizer> {
        self.syncs.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.syncs.contains_key(name)
    }

    /// Creates `name` if absent, seeding it from `seed_raw` and the name's
    /// hash. An existing synchronizer of another type is retyped in place.
    pub fn create(&mut self, name: &str, kind: SyncType, seed_raw: u64) -> &mut Synchronizer {
        let pinned = self.queued_pins.remove(name);
        let sync = self.syncs.entry(name.to_string()).or_insert_with(|| {
            debug!(sync = name, ?kind, "creating synchronizer");
            Synchronizer::new(kind, seed_raw ^ name_hash(name))
        });
        if sync.kind != kind {
            sync.kind = kind;
            sync.index = 0;
            sync.bounce = false;
            sync.fill_slots();
        }
        if pinned {
            sync.pinned = true;
        }
        sync
    }

    /// Pins or unpins `name`. Pins for unknown names are held until the
    /// synchronizer is created.
    pub fn set_pinned(&mut self, name: &str, pinned: bool) {
        match self.syncs.get_mut(name) {
            Some(sync) => sync.pinned = pinned,
            None if pinned => {
                self.queued_pins.insert(name.to_string());
            }
            None => {
                self.queued_pins.remove(name);
            }
        }
    }

    /// Forces `name` forward one slot. Returns `false` if it does not exist.
    pub fn step(&mut self, name: &str) -> bool {
        match self.syncs.get_mut(name) {
            Some(sync) => {
                sync.step(true);
                true
            }
            None => false,
        }
    }

    /// Resets `name`. Returns `false` if it does not exist.
    pub fn reset(&mut self, name: &str) -> bool {
        match self.syncs.get_mut(name) {
            Some(sync) => {
                sync.reset();
                true
            }
            None => false,
        }
    }
}
