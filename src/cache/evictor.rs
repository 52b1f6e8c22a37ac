// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Background eviction strategy: caps cache growth by age and by count
//!
//! The cache itself only exposes the mechanical `evict_records_by_age` and
//! `evict_records_by_number` primitives; this module decides *when* and
//! *how much* to call them, mirroring the way the sending state machine
//! (`crate::state_machine`) separates pure decision logic from the
//! primitives it drives.

use super::store::BeaconCache;

/// Tunables for one eviction pass.
///
/// The two watermarks gate the whole pass on total cache size: nothing is
/// evicted at all below `high_water_mark_bytes`, which keeps a quiet cache
/// from paying any eviction cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Fragments older than `now_ms - max_record_age_ms` are candidates for
    /// the age-based pass.
    pub max_record_age_ms: i64,
    /// Below this total, a pass is skipped entirely.
    pub high_water_mark_bytes: i64,
    /// Target the age and count passes drive total size back down to.
    pub low_water_mark_bytes: i64,
}

impl EvictionPolicy {
    pub const fn new(max_record_age_ms: i64, high_water_mark_bytes: i64, low_water_mark_bytes: i64) -> Self {
        Self { max_record_age_ms, high_water_mark_bytes, low_water_mark_bytes }
    }
}

/// Result of a single eviction pass, for logging/metrics at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionOutcome {
    pub evicted_by_age: usize,
    pub evicted_by_count: usize,
}

impl EvictionOutcome {
    pub fn total(&self) -> usize {
        self.evicted_by_age + self.evicted_by_count
    }
}

/// Runs one eviction pass against `cache` using `policy`, given the
/// caller's notion of "now" in milliseconds (supplied rather than read
/// from the clock directly so the pass stays testable and so every
/// caller goes through the same `TimingProvider` — see `crate::providers`).
///
/// Below `high_water_mark_bytes` this is a no-op. Above it, every key is
/// walked once to drop age-expired fragments; if the cache is still above
/// `low_water_mark_bytes` afterwards, fragments are trimmed one at a time
/// across every key (oldest-first, round-robin by entry) until the cache
/// drops below the low-water mark or there is nothing left to trim.
pub fn run_eviction_pass(cache: &BeaconCache, policy: &EvictionPolicy, now_ms: i64) -> EvictionOutcome {
    let mut outcome = EvictionOutcome::default();
    if cache.total_bytes() <= policy.high_water_mark_bytes {
        return outcome;
    }

    let min_timestamp = now_ms.saturating_sub(policy.max_record_age_ms);
    outcome.evicted_by_age = cache.evict_records_by_age(min_timestamp);

    let mut cap = cache.max_live_fragment_count();
    while cache.total_bytes() > policy.low_water_mark_bytes && cap > 0 {
        cap -= 1;
        let removed = cache.evict_records_by_number(cap);
        if removed == 0 {
            break;
        }
        outcome.evicted_by_count += removed;
    }

    outcome
}
