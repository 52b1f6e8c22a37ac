// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Demo binary wiring the core beacon agent together with a stub HTTP
//! client and an in-memory session registry. Real deployments supply their
//! own [`HttpClient`] and session-tracking layer; this binary exists to
//! exercise the full `send_session → CaptureOn tick → drain` path end to
//! end without a live collector.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use beacon_agent_core::{
    beacon::{ActionRecord, BeaconAssembler},
    cache::{BeaconCache, BeaconKey, EvictionPolicy},
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    http::{HttpClient, QueryParams, StatusResponse},
    providers::{DefaultRandomProvider, DefaultThreadIdProvider, SystemTimingProvider},
    state_machine::{SendingContext, SessionProvider},
};
use bytes::Bytes;
use tokio::time::sleep;
use tracing::info;

/// A collector stand-in that logs every request and always answers OK.
/// Production binaries replace this with a real HTTP client.
struct LoggingHttpClient;

#[async_trait::async_trait]
impl HttpClient for LoggingHttpClient {
    async fn send_status_request(&self, _extra_params: &QueryParams) -> StatusResponse {
        info!("status request");
        StatusResponse::ok(None)
    }

    async fn send_beacon_request(
        &self,
        client_ip: &str,
        body: Bytes,
        _extra_params: &QueryParams,
    ) -> StatusResponse {
        info!(client_ip, bytes = body.len(), body = %String::from_utf8_lossy(&body), "beacon request");
        StatusResponse::ok(None)
    }
}

/// Minimal host-side session bookkeeping: the core only needs to ask "what
/// should I flush", so this keeps two plain maps rather than pulling in
/// the full session/action API the core deliberately leaves out of scope.
#[derive(Default)]
struct InMemorySessionRegistry {
    open: Mutex<HashMap<BeaconKey, Arc<BeaconAssembler>>>,
    finished: Mutex<HashMap<BeaconKey, Arc<BeaconAssembler>>>,
}

impl InMemorySessionRegistry {
    fn track_open(&self, beacon: Arc<BeaconAssembler>) {
        self.open.lock().unwrap_or_else(|p| p.into_inner()).insert(beacon.key(), beacon);
    }

    fn move_to_finished(&self, key: BeaconKey) {
        if let Some(beacon) = self.open.lock().unwrap_or_else(|p| p.into_inner()).remove(&key) {
            self.finished.lock().unwrap_or_else(|p| p.into_inner()).insert(key, beacon);
        }
    }
}

impl SessionProvider for InMemorySessionRegistry {
    fn finished_sessions(&self) -> Vec<Arc<BeaconAssembler>> {
        self.finished.lock().unwrap_or_else(|p| p.into_inner()).values().cloned().collect()
    }

    fn open_sessions(&self) -> Vec<Arc<BeaconAssembler>> {
        self.open.lock().unwrap_or_else(|p| p.into_inner()).values().cloned().collect()
    }

    fn forget_finished(&self, assembler: &Arc<BeaconAssembler>) {
        self.finished.lock().unwrap_or_else(|p| p.into_inner()).remove(&assembler.key());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _logger_guard = init_logger(&resolve_config_path("config/logger.yaml")?.to_string_lossy())?;

    let cfg = resolve_config_path("config/agent.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load agent config")?;

    let cache = Arc::new(BeaconCache::new());
    let server_config = Arc::new(beacon_agent_core::cfg::config::ServerConfigurationHolder::new(cfg.server));
    let timing = Arc::new(SystemTimingProvider::new());

    let eviction_policy = EvictionPolicy::new(
        cfg.runtime.max_record_age_ms,
        cfg.runtime.cache_high_water_mark_bytes,
        cfg.runtime.cache_low_water_mark_bytes,
    );

    let sending_ctx = Arc::new(SendingContext::new(
        Arc::clone(&server_config),
        timing.clone() as Arc<dyn beacon_agent_core::providers::TimingProvider>,
        cfg.runtime.status_retry_initial_delay_ms,
        cfg.runtime.status_retry_max_attempts,
        cfg.runtime.capture_off_poll_interval_ms,
        QueryParams::new(),
        Arc::clone(&cache),
        eviction_policy,
    ));

    let registry = Arc::new(InMemorySessionRegistry::default());
    let http: Arc<dyn HttpClient> = Arc::new(LoggingHttpClient);

    let sender_task = tokio::spawn(beacon_agent_core::state_machine::run(
        Arc::clone(&sending_ctx),
        registry.clone() as Arc<dyn SessionProvider>,
        Arc::clone(&http),
    ));

    let open_kit = Arc::new(cfg.open_kit.clone());
    let beacon = Arc::new(BeaconAssembler::new(
        BeaconKey::new(1, 0),
        Arc::clone(&cache),
        open_kit,
        cfg.privacy,
        Arc::clone(&server_config),
        timing.clone() as Arc<dyn beacon_agent_core::providers::TimingProvider>,
        Arc::new(DefaultThreadIdProvider::new()),
        Arc::new(DefaultRandomProvider::new()),
        None,
    ));
    registry.track_open(Arc::clone(&beacon));

    beacon.start_session();
    let action_id = beacon.create_id();
    let start_seq = beacon.create_sequence_number();
    beacon.add_action(&ActionRecord {
        id: action_id,
        parent_id: 0,
        name: "demo action".to_string(),
        start_sequence_number: start_seq,
        end_sequence_number: beacon.create_sequence_number(),
        start_time_ms: timing.now_ms(),
        end_time_ms: timing.now_ms() + 50,
    });
    beacon.report_value_int(action_id, "clicks", 3);
    beacon.end_session();
    registry.move_to_finished(beacon.key());

    sleep(Duration::from_millis(500)).await;

    info!("requesting shutdown");
    sending_ctx.request_shutdown();
    sender_task.await.context("sender task panicked")?;

    Ok(())
}
