// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The beacon assembler: privacy gating, immutable/mutable prefix
//! construction, per-event serialisation, and the chunked `send()` drain
//! loop.

use std::{
    net::IpAddr,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    },
};

use bytes::Bytes;

use super::{
    events::{ActionRecord, CrashReport, ErrorReport, WebRequestTracer},
    wire::{FragmentBuilder, build_web_request_tag, truncate_name},
};
use crate::{
    cache::{BeaconCache, BeaconKey, EventFragment},
    cfg::config::{OpenKitConfiguration, PrivacyConfiguration, ServerConfigurationHolder},
    http::{HttpClient, QueryParams, StatusResponse},
    protocol::{self, DEFAULT_MIN_SAFETY_MARGIN, EventType, keys},
    providers::{RandomProvider, ThreadIdProvider, TimingProvider},
};

/// Typical fragment size; just a capacity hint, not a bound.
const FRAGMENT_CAPACITY_HINT: usize = 128;

/// One session's beacon: owns its immutable prefix, its id/sequence
/// counters, and the cache key its fragments drain through.
pub struct BeaconAssembler {
    key: BeaconKey,
    cache: Arc<BeaconCache>,
    open_kit: Arc<OpenKitConfiguration>,
    privacy: PrivacyConfiguration,
    server_config: Arc<ServerConfigurationHolder>,
    timing: Arc<dyn TimingProvider>,
    thread_ids: Arc<dyn ThreadIdProvider>,
    random: Arc<dyn RandomProvider>,

    session_start_ms: i64,
    visitor_id: i64,
    client_ip: String,
    immutable_prefix: String,
    min_safety_margin: usize,

    next_id: AtomicI32,
    next_sequence_number: AtomicI32,
}

impl BeaconAssembler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: BeaconKey,
        cache: Arc<BeaconCache>,
        open_kit: Arc<OpenKitConfiguration>,
        privacy: PrivacyConfiguration,
        server_config: Arc<ServerConfigurationHolder>,
        timing: Arc<dyn TimingProvider>,
        thread_ids: Arc<dyn ThreadIdProvider>,
        random: Arc<dyn RandomProvider>,
        client_ip_literal: Option<&str>,
    ) -> Self {
        let session_start_ms = timing.now_ms();

        let visitor_id = if privacy.is_device_id_sending_allowed() {
            open_kit.device_id
        } else {
            random.next_positive_i64()
        };

        let client_ip = match client_ip_literal {
            Some(literal) if IpAddr::from_str(literal).is_ok() => literal.to_string(),
            Some(literal) => {
                tracing::warn!(client_ip = literal, "invalid client IP literal, omitting");
                String::new()
            },
            None => String::new(),
        };

        let mut assembler = Self {
            key,
            cache,
            open_kit,
            privacy,
            server_config,
            timing,
            thread_ids,
            random,
            session_start_ms,
            visitor_id,
            client_ip,
            immutable_prefix: String::new(),
            min_safety_margin: DEFAULT_MIN_SAFETY_MARGIN,
            next_id: AtomicI32::new(0),
            next_sequence_number: AtomicI32::new(0),
        };
        assembler.immutable_prefix = assembler.build_immutable_prefix();
        assembler
    }

    /// Overrides the default safety margin, for tests that need a small
    /// chunk budget.
    pub fn with_min_safety_margin(mut self, margin: usize) -> Self {
        self.min_safety_margin = margin;
        self
    }

    fn effective_session_number(&self) -> i32 {
        if self.privacy.is_session_number_reporting_allowed() {
            self.key.session_number
        } else {
            1
        }
    }

    fn build_immutable_prefix(&self) -> String {
        let mut b = FragmentBuilder::with_capacity(256);
        b.push_i64(keys::PROTOCOL_VERSION, protocol::PROTOCOL_VERSION as i64);
        b.push_encoded(keys::AGENT_VERSION, &self.open_kit.agent_version);
        b.push_encoded(keys::APPLICATION_ID, &self.open_kit.application_id);
        if let Some(name) = &self.open_kit.application_name {
            b.push_encoded(keys::APPLICATION_NAME, name);
        }
        if let Some(version) = &self.open_kit.application_version {
            b.push_encoded(keys::APPLICATION_VERSION, version);
        }
        b.push_i64(keys::PLATFORM_TYPE, protocol::PLATFORM_TYPE_OPENKIT as i64);
        b.push_raw(keys::AGENT_TECHNOLOGY_TYPE, protocol::AGENT_TECHNOLOGY_TYPE);
        b.push_i64(keys::VISITOR_ID, self.visitor_id);
        b.push_i64(keys::SESSION_NUMBER, self.effective_session_number() as i64);
        if !self.client_ip.is_empty() {
            b.push_raw(keys::CLIENT_IP, &self.client_ip);
        }
        if let Some(os) = &self.open_kit.operating_system {
            b.push_encoded(keys::OS, os);
        }
        if let Some(manufacturer) = &self.open_kit.manufacturer {
            b.push_encoded(keys::MANUFACTURER, manufacturer);
        }
        if let Some(model) = &self.open_kit.model_id {
            b.push_encoded(keys::MODEL, model);
        }
        b.push_i64(keys::DATA_COLLECTION_LEVEL, self.privacy.data_collection_level.code() as i64);
        b.push_i64(keys::CRASH_REPORTING_LEVEL, self.privacy.crash_reporting_level.code() as i64);
        b.finish()
    }

    /// Full prefix passed to the cache for one `send()` chunk: the
    /// immutable prefix followed by the fields rebuilt on every send.
    fn build_mutable_prefix(&self) -> String {
        let server = self.server_config.current();
        let mut b = FragmentBuilder::with_capacity(96);
        b.push_i64(keys::VISIT_STORE_VERSION, server.visit_store_version as i64);
        if server.visit_store_version > 1 {
            b.push_i64(keys::SESSION_SEQUENCE, self.key.session_sequence as i64);
        }
        b.push_i64(keys::TIMESTAMP_SEND, self.timing.now_ms());
        b.push_i64(keys::TIMESTAMP_SESSION_START, self.session_start_ms);
        b.push_i64(keys::MULTIPLICITY, server.multiplicity as i64);
        let suffix = b.finish();

        let mut out = String::with_capacity(self.immutable_prefix.len() + 1 + suffix.len());
        out.push_str(&self.immutable_prefix);
        if !suffix.is_empty() {
            out.push('&');
            out.push_str(&suffix);
        }
        out
    }

    fn capture_enabled(&self) -> bool {
        self.server_config.current().capture
    }

    pub fn create_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn create_sequence_number(&self) -> i32 {
        self.next_sequence_number.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub fn create_tag(&self, parent_action_id: i32, tracer_seq: i32) -> String {
        if !self.privacy.is_web_request_tracing_allowed() {
            return String::new();
        }
        let server = self.server_config.current();
        let encoded_app_id =
            protocol::encode_reserved(&self.open_kit.application_id).unwrap_or_default();
        build_web_request_tag(
            protocol::PROTOCOL_VERSION,
            server.server_id,
            self.visitor_id,
            self.effective_session_number(),
            self.key.session_sequence,
            server.visit_store_version,
            &encoded_app_id,
            parent_action_id,
            self.thread_ids.current_thread_id(),
            tracer_seq,
        )
    }

    fn now_relative_to_session(&self) -> i64 {
        self.timing.now_ms() - self.session_start_ms
    }

    fn basic_header(&self, event_type: EventType, name: Option<&str>) -> FragmentBuilder {
        let mut b = FragmentBuilder::with_capacity(FRAGMENT_CAPACITY_HINT);
        b.push_i64(keys::EVENT_TYPE, event_type.code() as i64);
        if let Some(name) = name {
            b.push_encoded(keys::NAME, &truncate_name(name));
        }
        b.push_i64(keys::THREAD_ID, self.thread_ids.current_thread_id());
        b
    }

    pub fn start_session(&self) {
        if !self.capture_enabled() {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.basic_header(EventType::SessionStart, None);
        b.push_i64(keys::PARENT_ACTION_ID, 0);
        b.push_i64(keys::START_SEQUENCE_NUMBER, seq as i64);
        b.push_i64(keys::TIME_0, self.now_relative_to_session());
        self.append_event(b);
    }

    pub fn end_session(&self) {
        if !(self.privacy.is_session_reporting_allowed() && self.capture_enabled()) {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.basic_header(EventType::SessionEnd, None);
        b.push_i64(keys::PARENT_ACTION_ID, 0);
        b.push_i64(keys::START_SEQUENCE_NUMBER, seq as i64);
        b.push_i64(keys::TIME_0, self.now_relative_to_session());
        self.append_event(b);
    }

    pub fn add_action(&self, action: &ActionRecord) {
        if !(self.privacy.is_action_reporting_allowed() && self.capture_enabled()) {
            return;
        }
        let mut b = self.basic_header(EventType::Action, Some(&action.name));
        b.push_i64(keys::ACTION_ID, action.id as i64);
        b.push_i64(keys::PARENT_ACTION_ID, action.parent_id as i64);
        b.push_i64(keys::START_SEQUENCE_NUMBER, action.start_sequence_number as i64);
        b.push_i64(keys::TIME_0, action.start_time_ms - self.session_start_ms);
        b.push_i64(keys::END_SEQUENCE_NUMBER, action.end_sequence_number as i64);
        b.push_i64(keys::TIME_1, action.end_time_ms - action.start_time_ms);
        self.append_action(b);
    }

    fn single_moment_header(&self, event_type: EventType, name: Option<&str>, parent_id: i32, seq: i32) -> FragmentBuilder {
        let mut b = self.basic_header(event_type, name);
        b.push_i64(keys::PARENT_ACTION_ID, parent_id as i64);
        b.push_i64(keys::START_SEQUENCE_NUMBER, seq as i64);
        b.push_i64(keys::TIME_0, self.now_relative_to_session());
        b
    }

    pub fn report_value_int(&self, parent_id: i32, name: &str, value: i64) {
        if !(self.privacy.is_value_reporting_allowed() && self.capture_enabled()) {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.single_moment_header(EventType::ValueInt, Some(name), parent_id, seq);
        b.push_i64(keys::VALUE, value);
        self.append_event(b);
    }

    pub fn report_value_double(&self, parent_id: i32, name: &str, value: f64) {
        if !(self.privacy.is_value_reporting_allowed() && self.capture_enabled()) {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.single_moment_header(EventType::ValueDouble, Some(name), parent_id, seq);
        b.push_f64(keys::VALUE, value);
        self.append_event(b);
    }

    pub fn report_value_string(&self, parent_id: i32, name: &str, value: Option<&str>) {
        if !(self.privacy.is_value_reporting_allowed() && self.capture_enabled()) {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.single_moment_header(EventType::ValueString, Some(name), parent_id, seq);
        if let Some(value) = value {
            b.push_encoded(keys::VALUE, value);
        }
        self.append_event(b);
    }

    pub fn report_event(&self, parent_id: i32, name: &str) {
        if !(self.privacy.is_event_reporting_allowed() && self.capture_enabled()) {
            return;
        }
        let seq = self.create_sequence_number();
        let b = self.single_moment_header(EventType::NamedEvent, Some(name), parent_id, seq);
        self.append_event(b);
    }

    pub fn report_error(&self, parent_id: i32, name: &str, error: &ErrorReport) {
        if !(self.privacy.is_error_reporting_allowed() && self.server_config.current().capture_errors) {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.single_moment_header(EventType::Error, Some(name), parent_id, seq);
        b.push_i64(keys::ERROR_VALUE, error.code as i64);
        b.push_encoded(keys::REASON, &error.reason);
        b.push_raw(keys::ERROR_TECHNOLOGY_TYPE, protocol::AGENT_TECHNOLOGY_TYPE);
        self.append_event(b);
    }

    pub fn report_crash(&self, crash: &CrashReport) {
        if !(self.privacy.is_crash_reporting_allowed() && self.server_config.current().capture_crashes) {
            return;
        }
        let seq = self.create_sequence_number();
        let mut b = self.single_moment_header(EventType::Crash, None, 0, seq);
        b.push_encoded(keys::REASON, &crash.reason);
        b.push_encoded(keys::STACK_TRACE, &crash.stack_trace);
        b.push_raw(keys::ERROR_TECHNOLOGY_TYPE, protocol::AGENT_TECHNOLOGY_TYPE);
        self.append_event(b);
    }

    pub fn add_web_request(&self, parent_id: i32, tracer: &WebRequestTracer) {
        if !(self.privacy.is_web_request_tracing_allowed() && self.capture_enabled()) {
            return;
        }
        let mut b = self.single_moment_header(
            EventType::WebRequest,
            None,
            parent_id,
            tracer.start_sequence_number,
        );
        b.push_i64_if_non_negative(keys::BYTES_SENT, tracer.bytes_sent);
        b.push_i64_if_non_negative(keys::BYTES_RECEIVED, tracer.bytes_received);
        b.push_i64_if_non_negative(keys::RESPONSE_CODE, tracer.response_code as i64);
        self.append_event(b);
    }

    pub fn identify_user(&self, tag: &str) {
        if !(self.privacy.is_user_identification_allowed() && self.capture_enabled()) {
            return;
        }
        let seq = self.create_sequence_number();
        let b = self.single_moment_header(EventType::IdentifyUser, Some(tag), 0, seq);
        self.append_event(b);
    }

    fn append_event(&self, fragment: FragmentBuilder) {
        let ts = self.timing.now_ms();
        self.cache.add_event_data(self.key, EventFragment::new(ts, fragment.finish()));
    }

    fn append_action(&self, fragment: FragmentBuilder) {
        let ts = self.timing.now_ms();
        self.cache.add_action_data(self.key, EventFragment::new(ts, fragment.finish()));
    }

    /// Drains the cache for this beacon's key, one HTTP request per
    /// chunk, rolling back the last chunk on transport failure.
    pub async fn send(
        &self,
        client: &dyn HttpClient,
        extra_params: &QueryParams,
    ) -> Option<StatusResponse> {
        let mut last_response = None;
        loop {
            let prefix = self.build_mutable_prefix();
            let budget = self.server_config.current().effective_beacon_size(self.min_safety_margin);
            let chunk = match self.cache.get_next_beacon_chunk(self.key, &prefix, budget, '&') {
                Some(chunk) => chunk,
                None => return last_response,
            };
            if chunk.is_empty() {
                return last_response;
            }

            let body = Bytes::from(chunk.into_bytes());
            let response = client.send_beacon_request(&self.client_ip, body, extra_params).await;

            if response.is_erroneous() {
                self.cache.reset_chunked_data(self.key);
                last_response = Some(response);
                return last_response;
            }

            self.cache.remove_chunked_data(self.key);
            last_response = Some(response);
        }
    }

    pub fn clear_data(&self) {
        self.cache.delete_cache_entry(self.key);
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty(self.key)
    }

    pub fn key(&self) -> BeaconKey {
        self.key
    }
}
