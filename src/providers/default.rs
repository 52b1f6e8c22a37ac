// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Default in-process implementations of the provider traits. Production
//! callers are expected to use these; tests substitute fakes to get
//! deterministic timestamps and ids.

use std::{
    sync::atomic::{AtomicI32, AtomicI64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use rand::Rng;

use super::traits::{RandomProvider, SessionIdProvider, ThreadIdProvider, TimingProvider};

/// Reads the system clock for both wall-clock and monotonic timing.
///
/// `monotonic_ms` is backed by `std::time::Instant` via a process-start
/// epoch captured once at construction, so it is immune to clock steps
/// even though `now_ms` is not.
#[derive(Debug)]
pub struct SystemTimingProvider {
    start: std::time::Instant,
}

impl SystemTimingProvider {
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Default for SystemTimingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingProvider for SystemTimingProvider {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn monotonic_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }
}

/// Assigns each caller thread a small monotonically increasing id the
/// first time it asks, memoized in a thread-local so repeated calls from
/// the same OS thread return the same value.
#[derive(Debug, Default)]
pub struct DefaultThreadIdProvider {
    next: AtomicI64,
}

thread_local! {
    static THREAD_ID: std::cell::Cell<Option<i64>> = const { std::cell::Cell::new(None) };
}

impl DefaultThreadIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThreadIdProvider for DefaultThreadIdProvider {
    fn current_thread_id(&self) -> i64 {
        if let Some(id) = THREAD_ID.with(|c| c.get()) {
            return id;
        }
        let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        THREAD_ID.with(|c| c.set(Some(id)));
        id
    }
}

/// Thread-local `rand::rng()`-backed source, used for device ids and
/// session identifiers.
#[derive(Debug, Default)]
pub struct DefaultRandomProvider;

impl DefaultRandomProvider {
    pub fn new() -> Self {
        Self
    }
}

impl RandomProvider for DefaultRandomProvider {
    fn next_i64(&self) -> i64 {
        rand::rng().random()
    }
}

/// Allocates session numbers from a process-wide counter. Real OpenKit
/// implementations draw an initial random seed and count down from it;
/// this just counts up from a random starting point, which satisfies the
/// same "practically unique within a process lifetime" requirement
/// without needing a signed-range wraparound policy.
#[derive(Debug)]
pub struct DefaultSessionIdProvider {
    counter: AtomicI32,
}

impl DefaultSessionIdProvider {
    pub fn new() -> Self {
        let seed = rand::rng().random::<i32>().unsigned_abs() as i32;
        Self { counter: AtomicI32::new(seed.max(1)) }
    }
}

impl Default for DefaultSessionIdProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdProvider for DefaultSessionIdProvider {
    fn next_session_number(&self) -> i32 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}
