// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared mutable state the sending-state-machine states read and write
//! between ticks.

use std::sync::{
    Arc,
    atomic::{AtomicI64, AtomicU8, Ordering},
};

use tokio_util::sync::CancellationToken;

use super::states::SendingState;
use crate::{
    cache::{BeaconCache, EvictionPolicy},
    cfg::config::ServerConfigurationHolder,
    http::QueryParams,
    providers::TimingProvider,
};

/// State shared across ticks of the sending loop: the current state tag,
/// the cooperative shutdown signal, the server-configuration holder, and
/// the two timestamps `CaptureOn` paces its flushing against.
///
/// Every field here is touched only by the sender task except the
/// shutdown signal, which any caller may trip via [`request_shutdown`].
pub struct SendingContext {
    server_config: Arc<ServerConfigurationHolder>,
    timing: Arc<dyn TimingProvider>,
    cancellation: CancellationToken,
    state: AtomicU8,
    last_status_check_ms: AtomicI64,
    last_open_session_send_ms: AtomicI64,
    last_eviction_pass_ms: AtomicI64,
    status_retry_initial_delay_ms: u64,
    status_retry_max_attempts: u32,
    capture_off_poll_interval_ms: u64,
    send_interval_ms_override: Option<u64>,
    extra_params: QueryParams,
    cache: Arc<BeaconCache>,
    eviction_policy: EvictionPolicy,
}

impl SendingContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_config: Arc<ServerConfigurationHolder>,
        timing: Arc<dyn TimingProvider>,
        status_retry_initial_delay_ms: u64,
        status_retry_max_attempts: u32,
        capture_off_poll_interval_ms: u64,
        extra_params: QueryParams,
        cache: Arc<BeaconCache>,
        eviction_policy: EvictionPolicy,
    ) -> Self {
        let now = timing.now_ms();
        Self {
            server_config,
            timing,
            cancellation: CancellationToken::new(),
            state: AtomicU8::new(SendingState::Init.as_u8()),
            last_status_check_ms: AtomicI64::new(now),
            last_open_session_send_ms: AtomicI64::new(now),
            last_eviction_pass_ms: AtomicI64::new(now),
            status_retry_initial_delay_ms,
            status_retry_max_attempts,
            capture_off_poll_interval_ms,
            send_interval_ms_override: None,
            extra_params,
            cache,
            eviction_policy,
        }
    }

    /// Overrides the server-negotiated `send_interval_ms` for tests that
    /// need a fast steady-state tick without installing a server config.
    pub fn with_send_interval_override(mut self, ms: u64) -> Self {
        self.send_interval_ms_override = Some(ms);
        self
    }

    pub fn server_config(&self) -> &Arc<ServerConfigurationHolder> {
        &self.server_config
    }

    pub fn timing(&self) -> &Arc<dyn TimingProvider> {
        &self.timing
    }

    pub fn extra_params(&self) -> &QueryParams {
        &self.extra_params
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Trips the shutdown signal. This never changes the state
    /// directly — the current state's next `execute` observes the flag and
    /// transitions to its own declared shutdown-state.
    pub fn request_shutdown(&self) {
        self.cancellation.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn state(&self) -> SendingState {
        SendingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: SendingState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn status_retry_initial_delay_ms(&self) -> u64 {
        self.status_retry_initial_delay_ms
    }

    pub fn status_retry_max_attempts(&self) -> u32 {
        self.status_retry_max_attempts
    }

    pub fn capture_off_poll_interval_ms(&self) -> u64 {
        self.capture_off_poll_interval_ms
    }

    pub fn send_interval_ms(&self) -> u64 {
        self.send_interval_ms_override
            .unwrap_or_else(|| self.server_config.current().send_interval_ms.max(0) as u64)
    }

    pub fn mark_status_checked(&self) {
        self.last_status_check_ms.store(self.timing.now_ms(), Ordering::SeqCst);
    }

    pub fn mark_open_session_beacons_sent(&self) {
        self.last_open_session_send_ms.store(self.timing.now_ms(), Ordering::SeqCst);
    }

    /// True once at least `send_interval_ms` has elapsed since the last
    /// open-session flush.
    pub fn open_session_send_due(&self) -> bool {
        let elapsed = self.timing.now_ms() - self.last_open_session_send_ms.load(Ordering::SeqCst);
        elapsed >= self.send_interval_ms() as i64
    }

    /// Runs an eviction pass at most once per `send_interval_ms`, logging
    /// anything it drops. The pass itself is a no-op below the high-water
    /// mark, so calling this every tick costs nothing once the cache is
    /// quiet.
    pub fn run_due_eviction_pass(&self) {
        let now = self.timing.now_ms();
        let elapsed = now - self.last_eviction_pass_ms.load(Ordering::SeqCst);
        if elapsed < self.send_interval_ms() as i64 {
            return;
        }
        self.last_eviction_pass_ms.store(now, Ordering::SeqCst);

        let outcome = crate::cache::run_eviction_pass(&self.cache, &self.eviction_policy, now);
        if outcome.total() > 0 {
            tracing::debug!(
                evicted_by_age = outcome.evicted_by_age,
                evicted_by_count = outcome.evicted_by_count,
                "cache eviction pass"
            );
        }
    }
}
