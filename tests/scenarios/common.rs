// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared fixtures for the end-to-end scenarios: deterministic provider
//! fakes, a body-recording mock [`HttpClient`], and a tiny parser that
//! turns a drained beacon body back into per-event field maps.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
};

use beacon_agent_core::{
    beacon::BeaconAssembler,
    cache::{BeaconCache, BeaconKey},
    cfg::{
        config::{OpenKitConfiguration, PrivacyConfiguration, ServerConfiguration, ServerConfigurationHolder},
        enums::{CrashReportingLevel, DataCollectionLevel},
    },
    http::{HttpClient, QueryParams, StatusResponse},
    providers::{ThreadIdProvider, TimingProvider},
};
use bytes::Bytes;

/// A clock callers advance by hand, so `t0`/`t1`/`tx`/`tv` come out as
/// predictable small integers instead of real wall-clock milliseconds.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ms: AtomicI64,
}

impl FakeClock {
    pub fn starting_at(now_ms: i64) -> Arc<Self> {
        Arc::new(Self { now_ms: AtomicI64::new(now_ms) })
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimingProvider for FakeClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn monotonic_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Always answers with the same process-local id, the simplest thing that
/// satisfies `ThreadIdProvider`'s "stable per-thread identifier" contract.
#[derive(Debug)]
pub struct FixedThreadId(pub i64);

impl ThreadIdProvider for FixedThreadId {
    fn current_thread_id(&self) -> i64 {
        self.0
    }
}

/// Records every beacon body it is handed and answers with a scripted
/// sequence of [`StatusResponse`]s (repeating the last one once exhausted).
#[derive(Debug, Default)]
pub struct RecordingHttpClient {
    pub beacon_bodies: Mutex<Vec<Bytes>>,
    responses: Mutex<Vec<StatusResponse>>,
    calls: AtomicUsize,
}

impl RecordingHttpClient {
    pub fn with_responses(responses: Vec<StatusResponse>) -> Self {
        Self { beacon_bodies: Mutex::new(Vec::new()), responses: Mutex::new(responses), calls: AtomicUsize::new(0) }
    }

    pub fn always_ok() -> Self {
        Self::with_responses(vec![StatusResponse::ok(None)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies_as_strings(&self) -> Vec<String> {
        self.beacon_bodies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }
}

#[async_trait::async_trait]
impl HttpClient for RecordingHttpClient {
    async fn send_status_request(&self, _extra_params: &QueryParams) -> StatusResponse {
        StatusResponse::ok(None)
    }

    async fn send_beacon_request(&self, _client_ip: &str, body: Bytes, _extra_params: &QueryParams) -> StatusResponse {
        self.beacon_bodies.lock().unwrap_or_else(|p| p.into_inner()).push(body);
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        responses.get(idx).or_else(|| responses.last()).cloned().unwrap_or_else(|| StatusResponse::ok(None))
    }
}

/// One parsed `et=...` event, as a flat key/value map (later keys of the
/// same name would overwrite earlier ones, which never happens within a
/// single event's fragment).
pub type ParsedEvent = BTreeMap<String, String>;

/// Splits a full beacon body into its constituent events.
///
/// The body is just one long `&`-joined run of `key=value` tokens — the
/// prefix's fields followed by every fragment's fields back to back, with
/// no structural marker between fragments other than the fact that every
/// fragment starts with `et=`. So: tokenize on `&`, and start a new event
/// map every time an `et` key is seen. Prefix fields collected before the
/// first `et` are returned separately.
pub fn parse_body(body: &str) -> (ParsedEvent, Vec<ParsedEvent>) {
    let mut prefix = ParsedEvent::new();
    let mut events: Vec<ParsedEvent> = Vec::new();

    for token in body.split('&') {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        if key == "et" {
            events.push(ParsedEvent::new());
        }
        match events.last_mut() {
            Some(event) => {
                event.insert(key.to_string(), value.to_string());
            },
            None => {
                prefix.insert(key.to_string(), value.to_string());
            },
        }
    }

    (prefix, events)
}

pub fn sample_open_kit(device_id: i64) -> Arc<OpenKitConfiguration> {
    Arc::new(OpenKitConfiguration {
        application_id: "app".to_string(),
        application_name: None,
        application_version: None,
        device_id,
        operating_system: None,
        manufacturer: None,
        model_id: None,
        agent_version: "1.0".to_string(),
    })
}

pub fn sample_privacy(level: DataCollectionLevel) -> PrivacyConfiguration {
    PrivacyConfiguration { data_collection_level: level, crash_reporting_level: CrashReportingLevel::OptInCrashes }
}

pub fn sample_server_config(capture: bool, beacon_size_in_bytes: i32) -> ServerConfiguration {
    ServerConfiguration {
        capture,
        capture_errors: true,
        capture_crashes: true,
        beacon_size_in_bytes,
        send_interval_ms: 1_000,
        multiplicity: 1,
        visit_store_version: 1,
        max_events_per_session: 500,
        session_timeout_ms: 600_000,
        session_duration_ms: 14_400_000,
        server_id: 1,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn make_assembler(
    cache: &Arc<BeaconCache>,
    key: BeaconKey,
    level: DataCollectionLevel,
    device_id: i64,
    server_config: ServerConfiguration,
    clock: Arc<FakeClock>,
) -> BeaconAssembler {
    BeaconAssembler::new(
        key,
        Arc::clone(cache),
        sample_open_kit(device_id),
        sample_privacy(level),
        Arc::new(ServerConfigurationHolder::new(server_config)),
        clock,
        Arc::new(FixedThreadId(7)),
        Arc::new(beacon_agent_core::providers::DefaultRandomProvider::new()),
        None,
    )
}

pub fn empty_params() -> QueryParams {
    QueryParams::new()
}
