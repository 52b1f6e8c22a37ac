// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The beacon cache itself: a keyed, thread-safe store of pending event
//! fragments with chunked drain and age/size eviction.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use dashmap::DashMap;

use super::{entry::CacheEntry, fragment::EventFragment, key::BeaconKey};

/// Thread-safe store of per-[`BeaconKey`] fragment sequences.
///
/// Keyed access goes through `dashmap::DashMap`, whose shard locking
/// stands in for the single global lock described for key-set mutation;
/// each entry additionally carries its own lock for sequence mutation, so
/// the acquisition order the cache was specified with (global, then
/// per-key) is preserved in spirit even though no single `Mutex` guards
/// the whole key set. See `DESIGN.md` for the full rationale.
#[derive(Debug, Default)]
pub struct BeaconCache {
    entries: DashMap<BeaconKey, Arc<CacheEntry>>,
    total_bytes: AtomicI64,
}

impl BeaconCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_for(&self, key: BeaconKey) -> Arc<CacheEntry> {
        Arc::clone(
            self.entries
                .entry(key)
                .or_insert_with(|| Arc::new(CacheEntry::new()))
                .value(),
        )
    }

    pub fn add_action_data(&self, key: BeaconKey, fragment: EventFragment) {
        self.entry_for(key).add_action_data(&self.total_bytes, fragment);
    }

    pub fn add_event_data(&self, key: BeaconKey, fragment: EventFragment) {
        self.entry_for(key).add_event_data(&self.total_bytes, fragment);
    }

    /// Removes the entry for `key` entirely, crediting its remaining bytes
    /// back out of the aggregate counter.
    pub fn delete_cache_entry(&self, key: BeaconKey) {
        if let Some((_, entry)) = self.entries.remove(&key) {
            let freed = entry.total_byte_len();
            if freed != 0 {
                self.total_bytes.fetch_sub(freed, Ordering::SeqCst);
            }
        }
    }

    /// True iff no entry exists for `key`, or its live sequences are both
    /// empty.
    pub fn is_empty(&self, key: BeaconKey) -> bool {
        match self.entries.get(&key) {
            Some(entry) => entry.is_empty(),
            None => true,
        }
    }

    /// True iff the cache holds no entries at all.
    pub fn is_cache_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregate bytes currently held across all entries and all three
    /// sequences (live + to-be-sent + in-flight).
    pub fn total_bytes(&self) -> i64 {
        self.total_bytes.load(Ordering::SeqCst)
    }

    pub fn get_next_beacon_chunk(
        &self,
        key: BeaconKey,
        prefix: &str,
        max_size: usize,
        delim: char,
    ) -> Option<String> {
        let entry = self.entries.get(&key)?;
        Some(entry.get_next_beacon_chunk(&self.total_bytes, prefix, max_size, delim))
    }

    pub fn remove_chunked_data(&self, key: BeaconKey) {
        if let Some(entry) = self.entries.get(&key) {
            entry.remove_chunked_data();
        }
    }

    pub fn reset_chunked_data(&self, key: BeaconKey) {
        if let Some(entry) = self.entries.get(&key) {
            entry.reset_chunked_data(&self.total_bytes);
        }
    }

    /// Evicts fragments older than `min_timestamp` across every entry,
    /// dropping entries left empty. Returns the total number of fragments
    /// evicted.
    pub fn evict_records_by_age(&self, min_timestamp: i64) -> usize {
        let mut evicted = 0usize;
        self.entries.retain(|_key, entry| {
            evicted += entry.evict_by_age(&self.total_bytes, min_timestamp);
            !entry.is_empty()
        });
        evicted
    }

    /// Evicts the oldest fragments across every entry until each entry
    /// holds at most `max_keep_per_entry` live fragments. Returns the
    /// total number of fragments evicted.
    pub fn evict_records_by_number(&self, max_keep_per_entry: usize) -> usize {
        let mut evicted = 0usize;
        self.entries.retain(|_key, entry| {
            evicted += entry.evict_by_number(&self.total_bytes, max_keep_per_entry);
            !entry.is_empty()
        });
        evicted
    }

    /// Number of entries currently tracked (including ones with only
    /// in-flight/to-be-sent data left).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Largest live-fragment count held by any single entry, used by the
    /// evictor to pick a starting cap for its round-robin count pass.
    pub fn max_live_fragment_count(&self) -> usize {
        self.entries.iter().map(|e| e.live_fragment_count()).max().unwrap_or(0)
    }

    #[cfg(test)]
    pub fn live_fragment_count(&self, key: BeaconKey) -> usize {
        self.entries
            .get(&key)
            .map(|e| e.live_fragment_count())
            .unwrap_or(0)
    }

    /// Snapshot of (action payloads, event payloads) in live-sequence
    /// order, for assertions in other modules' tests.
    #[cfg(test)]
    pub fn debug_snapshot(&self, key: BeaconKey) -> (Vec<String>, Vec<String>) {
        self.entries
            .get(&key)
            .map(|e| e.snapshot_live())
            .unwrap_or_default()
    }
}
