// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The sending-state-machine proper: a tagged `enum` over the five states
//! plus a vtable-free `execute` dispatch function, rather than a trait-object
//! state hierarchy.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{context::SendingContext, registry::SessionProvider};
use crate::http::HttpClient;

/// One state of the sending loop.
///
/// Transitions are driven exclusively by [`execute`]; nothing outside this
/// module ever constructs a successor state by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendingState {
    Init = 0,
    CaptureOn = 1,
    CaptureOff = 2,
    FlushSessions = 3,
    Terminal = 4,
}

impl SendingState {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => SendingState::Init,
            1 => SendingState::CaptureOn,
            2 => SendingState::CaptureOff,
            3 => SendingState::FlushSessions,
            _ => SendingState::Terminal,
        }
    }

    /// True for the one state the worker loop exits on.
    pub const fn is_terminal_state(self) -> bool {
        matches!(self, SendingState::Terminal)
    }

    /// The state `execute` transitions to once a shutdown has been
    /// requested. A pure function of the tag alone — no context needed to
    /// answer it.
    pub const fn shutdown_state(self) -> SendingState {
        match self {
            SendingState::Init => SendingState::Terminal,
            SendingState::CaptureOn => SendingState::FlushSessions,
            SendingState::CaptureOff => SendingState::Terminal,
            SendingState::FlushSessions => SendingState::Terminal,
            SendingState::Terminal => SendingState::Terminal,
        }
    }
}

/// Sleeps for `duration` unless `cancel` fires first. Returns `false` if
/// the sleep was cut short by cancellation.
async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

/// Polls `send_status_request` with linearly increasing sleep between
/// attempts. Returns `None` if every attempt came back erroneous, or
/// shutdown was requested mid-retry.
async fn poll_status_with_retry(
    ctx: &SendingContext,
    http: &dyn HttpClient,
) -> Option<crate::http::StatusResponse> {
    let attempts = ctx.status_retry_max_attempts().max(1);
    for attempt in 0..attempts {
        if ctx.is_shutdown_requested() {
            return None;
        }
        let response = http.send_status_request(ctx.extra_params()).await;
        ctx.mark_status_checked();
        if !response.is_erroneous() {
            return Some(response);
        }
        tracing::warn!(attempt, attempts, "status request failed");
        if attempt + 1 < attempts {
            let delay_ms = ctx.status_retry_initial_delay_ms() * u64::from(attempt + 1);
            if !cancellable_sleep(Duration::from_millis(delay_ms), ctx.cancellation()).await {
                return None;
            }
        }
    }
    None
}

fn install_patch_if_present(ctx: &SendingContext, response: &crate::http::StatusResponse) {
    let Some(patch) = response.server_configuration.clone() else {
        return;
    };
    if let Err(err) = ctx.server_config().apply_patch(patch) {
        tracing::warn!(error = %err, "rejected server configuration patch");
    }
}

async fn exec_init(ctx: &SendingContext, http: &dyn HttpClient) -> SendingState {
    if ctx.is_shutdown_requested() {
        return SendingState::Init.shutdown_state();
    }

    match poll_status_with_retry(ctx, http).await {
        Some(response) => {
            install_patch_if_present(ctx, &response);
            if ctx.server_config().current().capture {
                SendingState::CaptureOn
            } else {
                SendingState::CaptureOff
            }
        },
        None => {
            tracing::warn!("status retries exhausted in Init; starting with capture disabled");
            SendingState::CaptureOff
        },
    }
}

async fn exec_capture_on(
    ctx: &SendingContext,
    sessions: &dyn SessionProvider,
    http: &dyn HttpClient,
) -> SendingState {
    if ctx.is_shutdown_requested() {
        return SendingState::CaptureOn.shutdown_state();
    }

    for finished in sessions.finished_sessions() {
        finished.send(http, ctx.extra_params()).await;
        if finished.is_empty() {
            sessions.forget_finished(&finished);
        }
    }

    if ctx.open_session_send_due() {
        for open in sessions.open_sessions() {
            open.send(http, ctx.extra_params()).await;
        }
        ctx.mark_open_session_beacons_sent();
    }

    ctx.run_due_eviction_pass();

    if !ctx.server_config().current().capture {
        return SendingState::CaptureOff;
    }

    let tick = Duration::from_millis(ctx.send_interval_ms().max(1));
    let slept_fully = cancellable_sleep(tick, ctx.cancellation()).await;
    if !slept_fully || ctx.is_shutdown_requested() {
        return SendingState::CaptureOn.shutdown_state();
    }

    if ctx.server_config().current().capture {
        SendingState::CaptureOn
    } else {
        SendingState::CaptureOff
    }
}

async fn exec_capture_off(ctx: &SendingContext, http: &dyn HttpClient) -> SendingState {
    if ctx.is_shutdown_requested() {
        return SendingState::CaptureOff.shutdown_state();
    }

    let slept_fully =
        cancellable_sleep(Duration::from_millis(ctx.capture_off_poll_interval_ms()), ctx.cancellation()).await;
    if !slept_fully || ctx.is_shutdown_requested() {
        return SendingState::CaptureOff.shutdown_state();
    }

    let response = http.send_status_request(ctx.extra_params()).await;
    ctx.mark_status_checked();
    if !response.is_erroneous() {
        install_patch_if_present(ctx, &response);
    }

    if ctx.server_config().current().capture {
        SendingState::CaptureOn
    } else {
        SendingState::CaptureOff
    }
}

async fn exec_flush_sessions(
    ctx: &SendingContext,
    sessions: &dyn SessionProvider,
    http: &dyn HttpClient,
) -> SendingState {
    for beacon in sessions.all_sessions() {
        beacon.send(http, ctx.extra_params()).await;
        if beacon.is_empty() {
            sessions.forget_finished(&beacon);
        }
    }
    SendingState::Terminal
}

fn exec_terminal(ctx: &SendingContext) -> SendingState {
    ctx.request_shutdown();
    SendingState::Terminal
}

/// Dispatches one tick of `state` with a plain `match` — no trait object,
/// no dynamic dispatch.
pub async fn execute(
    state: SendingState,
    ctx: &SendingContext,
    sessions: &dyn SessionProvider,
    http: &dyn HttpClient,
) -> SendingState {
    match state {
        SendingState::Init => exec_init(ctx, http).await,
        SendingState::CaptureOn => exec_capture_on(ctx, sessions, http).await,
        SendingState::CaptureOff => exec_capture_off(ctx, http).await,
        SendingState::FlushSessions => exec_flush_sessions(ctx, sessions, http).await,
        SendingState::Terminal => exec_terminal(ctx),
    }
}

/// Drives the state machine from `Init` to completion, calling `execute`
/// repeatedly until it reports a terminal state. Intended to run as
/// the single dedicated sender task for a given beacon cache.
pub async fn run(
    ctx: std::sync::Arc<SendingContext>,
    sessions: std::sync::Arc<dyn SessionProvider>,
    http: std::sync::Arc<dyn HttpClient>,
) {
    let mut state = SendingState::Init;
    loop {
        ctx.set_state(state);
        tracing::info!(?state, "sending state machine tick");
        if state.is_terminal_state() {
            execute(state, &ctx, sessions.as_ref(), http.as_ref()).await;
            break;
        }
        state = execute(state, &ctx, sessions.as_ref(), http.as_ref()).await;
    }
    ctx.set_state(SendingState::Terminal);
}
