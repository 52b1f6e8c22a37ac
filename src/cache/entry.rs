// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Per-[`BeaconKey`] cache state: the `eventData`/`actionData` live
//! sequences plus the `toBeSent`/in-flight bookkeeping used by chunked
//! drain and rollback.

use std::{
    collections::VecDeque,
    sync::{Mutex, atomic::AtomicI64, atomic::Ordering},
};

use super::fragment::EventFragment;

/// Which live sequence a queued fragment was pulled from, so it can be
/// restored to the right place on rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Action,
    Event,
}

#[derive(Debug, Clone)]
struct Queued {
    origin: Origin,
    fragment: EventFragment,
}

#[derive(Debug, Default)]
struct Inner {
    event_data: VecDeque<EventFragment>,
    action_data: VecDeque<EventFragment>,
    /// Fragments pulled out for the current drain round but not yet
    /// packed into a chunk.
    to_be_sent: VecDeque<Queued>,
    /// Fragments packed into the chunk most recently returned by
    /// `get_next_beacon_chunk`, whose transmission outcome is not yet
    /// known. Resolved by exactly one of `remove_chunked` / `reset_chunked`.
    in_flight: VecDeque<Queued>,
}

/// All cached state for one [`BeaconKey`]. Mutation is guarded by a lock
/// scoped to this entry.
#[derive(Debug, Default)]
pub struct CacheEntry {
    inner: Mutex<Inner>,
}

impl CacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_action_data(&self, total_bytes: &AtomicI64, fragment: EventFragment) {
        let len = fragment.byte_len() as i64;
        self.lock().action_data.push_back(fragment);
        total_bytes.fetch_add(len, Ordering::SeqCst);
    }

    pub fn add_event_data(&self, total_bytes: &AtomicI64, fragment: EventFragment) {
        let len = fragment.byte_len() as i64;
        self.lock().event_data.push_back(fragment);
        total_bytes.fetch_add(len, Ordering::SeqCst);
    }

    /// True iff both live sequences are empty (ignores in-flight/to-be-sent
    /// state).
    pub fn is_empty(&self) -> bool {
        let inner = self.lock();
        inner.event_data.is_empty() && inner.action_data.is_empty()
    }

    /// Builds one chunk: `prefix` followed by `delim + payload` for as many
    /// leading fragments as fit within `max_size`. Consumed fragments move
    /// into the in-flight set and are subtracted from `total_bytes`
    /// immediately.
    ///
    /// Returns an empty string if nothing could be drained this call.
    pub fn get_next_beacon_chunk(
        &self,
        total_bytes: &AtomicI64,
        prefix: &str,
        max_size: usize,
        delim: char,
    ) -> String {
        let mut inner = self.lock();

        if inner.to_be_sent.is_empty() && inner.in_flight.is_empty() {
            while let Some(fragment) = inner.action_data.pop_front() {
                inner.to_be_sent.push_back(Queued { origin: Origin::Action, fragment });
            }
            while let Some(fragment) = inner.event_data.pop_front() {
                inner.to_be_sent.push_back(Queued { origin: Origin::Event, fragment });
            }
        }

        let mut out = String::with_capacity(prefix.len());
        out.push_str(prefix);
        let mut drained = 0usize;
        let mut freed = 0i64;

        while let Some(next) = inner.to_be_sent.front() {
            let additional = 1 + next.fragment.byte_len();
            if out.len() + additional > max_size && drained > 0 {
                break;
            }
            // Always drain at least one fragment even if it alone exceeds
            // max_size, so a single oversized fragment cannot wedge the
            // drain loop forever.
            let queued = inner
                .to_be_sent
                .pop_front()
                .expect("front() just returned Some");
            out.push(delim);
            out.push_str(&queued.fragment.payload);
            freed += queued.fragment.byte_len() as i64;
            drained += 1;
            inner.in_flight.push_back(queued);
        }

        drop(inner);
        if freed != 0 {
            total_bytes.fetch_sub(freed, Ordering::SeqCst);
        }

        if drained == 0 { String::new() } else { out }
    }

    /// Drops the in-flight set: the chunk it represented was accepted by
    /// the collector. Size was already decremented at drain time.
    pub fn remove_chunked_data(&self) {
        self.lock().in_flight.clear();
    }

    /// Restores both the in-flight set and any still-queued `to_be_sent`
    /// remainder to the front of their original live sequences, preserving
    /// order. `in_flight` was queued ahead of whatever is left in
    /// `to_be_sent`, so it is restored first.
    ///
    /// Only `in_flight`'s bytes are credited back to `total_bytes`:
    /// `get_next_beacon_chunk` subtracts a fragment's bytes the moment it
    /// moves into `in_flight`, but a fragment sitting in `to_be_sent` was
    /// never subtracted in the first place, so restoring it must not add
    /// its bytes a second time.
    pub fn reset_chunked_data(&self, total_bytes: &AtomicI64) {
        let mut inner = self.lock();
        let mut restored = 0i64;
        let mut restored_action = VecDeque::new();
        let mut restored_event = VecDeque::new();

        while let Some(queued) = inner.in_flight.pop_front() {
            restored += queued.fragment.byte_len() as i64;
            match queued.origin {
                Origin::Action => restored_action.push_back(queued.fragment),
                Origin::Event => restored_event.push_back(queued.fragment),
            }
        }
        while let Some(queued) = inner.to_be_sent.pop_front() {
            match queued.origin {
                Origin::Action => restored_action.push_back(queued.fragment),
                Origin::Event => restored_event.push_back(queued.fragment),
            }
        }

        while let Some(fragment) = restored_action.pop_back() {
            inner.action_data.push_front(fragment);
        }
        while let Some(fragment) = restored_event.pop_back() {
            inner.event_data.push_front(fragment);
        }

        drop(inner);
        if restored != 0 {
            total_bytes.fetch_add(restored, Ordering::SeqCst);
        }
    }

    /// Removes leading (oldest-first) fragments with `ts < min_timestamp`
    /// from both live sequences. Returns the number removed.
    pub fn evict_by_age(&self, total_bytes: &AtomicI64, min_timestamp: i64) -> usize {
        let mut inner = self.lock();
        let mut removed = 0usize;
        let mut freed = 0i64;
        for seq in [&mut inner.action_data, &mut inner.event_data] {
            while let Some(front) = seq.front() {
                if front.timestamp_ms < min_timestamp {
                    let f = seq.pop_front().expect("front() just returned Some");
                    freed += f.byte_len() as i64;
                    removed += 1;
                } else {
                    break;
                }
            }
        }
        drop(inner);
        if freed != 0 {
            total_bytes.fetch_sub(freed, Ordering::SeqCst);
        }
        removed
    }

    /// Removes leading fragments (action sequence first, then event) until
    /// the combined live fragment count is at most `max_keep`.
    pub fn evict_by_number(&self, total_bytes: &AtomicI64, max_keep: usize) -> usize {
        let mut inner = self.lock();
        let mut removed = 0usize;
        let mut freed = 0i64;
        let mut total = inner.action_data.len() + inner.event_data.len();
        while total > max_keep {
            let popped = if !inner.action_data.is_empty() {
                inner.action_data.pop_front()
            } else {
                inner.event_data.pop_front()
            };
            let Some(f) = popped else { break };
            freed += f.byte_len() as i64;
            removed += 1;
            total -= 1;
        }
        drop(inner);
        if freed != 0 {
            total_bytes.fetch_sub(freed, Ordering::SeqCst);
        }
        removed
    }

    /// Live fragment count across both live sequences (used by the
    /// evictor and tests; ignores in-flight/to-be-sent state).
    pub fn live_fragment_count(&self) -> usize {
        let inner = self.lock();
        inner.action_data.len() + inner.event_data.len()
    }

    /// Total bytes currently held by this entry across all three
    /// sequences (live + to-be-sent + in-flight), for invariant checks
    /// and whole-entry removal.
    pub fn total_byte_len(&self) -> i64 {
        let inner = self.lock();
        let mut total = 0i64;
        for f in inner.action_data.iter().chain(inner.event_data.iter()) {
            total += f.byte_len() as i64;
        }
        for q in inner.to_be_sent.iter().chain(inner.in_flight.iter()) {
            total += q.fragment.byte_len() as i64;
        }
        total
    }

    #[cfg(test)]
    pub fn snapshot_live(&self) -> (Vec<String>, Vec<String>) {
        let inner = self.lock();
        (
            inner.action_data.iter().map(|f| f.payload.clone()).collect(),
            inner.event_data.iter().map(|f| f.payload.clone()).collect(),
        )
    }
}
