// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, sync::Mutex};

use anyhow::{Context, Result, ensure};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{CrashReportingLevel, DataCollectionLevel};

/// Top-level configuration tree, loaded once at agent boot.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Static application/device identity, fixed for the process lifetime.
    pub open_kit: OpenKitConfiguration,
    /// Privacy consent levels and the capability booleans derived from
    /// them.
    pub privacy: PrivacyConfiguration,
    /// Initial server-negotiated limits, used until the first status
    /// response overwrites them.
    pub server: ServerConfiguration,
    /// Implementation/runtime parameters that live outside the wire
    /// protocol.
    pub runtime: RuntimeConfig,
}

/// Static identity reported in every beacon's immutable prefix.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OpenKitConfiguration {
    #[serde(rename = "ApplicationId")]
    pub application_id: String,

    #[serde(default, rename = "ApplicationName")]
    pub application_name: Option<String>,

    #[serde(default, rename = "ApplicationVersion")]
    pub application_version: Option<String>,

    #[serde(rename = "DeviceId")]
    pub device_id: i64,

    #[serde(default, rename = "OperatingSystem")]
    pub operating_system: Option<String>,

    #[serde(default, rename = "Manufacturer")]
    pub manufacturer: Option<String>,

    #[serde(default, rename = "ModelId")]
    pub model_id: Option<String>,

    #[serde(default, rename = "AgentVersion")]
    pub agent_version: String,
}

/// Privacy consent configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct PrivacyConfiguration {
    #[serde(rename = "DataCollectionLevel")]
    pub data_collection_level: DataCollectionLevel,

    #[serde(rename = "CrashReportingLevel")]
    pub crash_reporting_level: CrashReportingLevel,
}

impl PrivacyConfiguration {
    pub fn is_session_number_reporting_allowed(&self) -> bool {
        self.data_collection_level.is_session_number_reporting_allowed()
    }

    pub fn is_action_reporting_allowed(&self) -> bool {
        self.data_collection_level.is_action_reporting_allowed()
    }

    pub fn is_value_reporting_allowed(&self) -> bool {
        self.data_collection_level.is_value_reporting_allowed()
    }

    pub fn is_event_reporting_allowed(&self) -> bool {
        self.data_collection_level.is_event_reporting_allowed()
    }

    pub fn is_session_reporting_allowed(&self) -> bool {
        self.data_collection_level.is_session_reporting_allowed()
    }

    pub fn is_web_request_tracing_allowed(&self) -> bool {
        self.data_collection_level.is_web_request_tracing_allowed()
    }

    pub fn is_user_identification_allowed(&self) -> bool {
        self.data_collection_level.is_user_identification_allowed()
    }

    pub fn is_device_id_sending_allowed(&self) -> bool {
        self.data_collection_level.is_device_id_sending_allowed()
    }

    pub fn is_error_reporting_allowed(&self) -> bool {
        self.crash_reporting_level.is_error_reporting_allowed()
    }

    pub fn is_crash_reporting_allowed(&self) -> bool {
        self.crash_reporting_level.is_crash_reporting_allowed()
    }
}

/// Server-negotiated limits. The agent starts with the configured
/// defaults below and overwrites this sub-tree wholesale whenever a
/// status response carries a patch — see [`ServerConfigurationHolder`].
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct ServerConfiguration {
    #[serde(rename = "Capture", default = "default_true")]
    pub capture: bool,

    #[serde(rename = "CaptureErrors", default = "default_true")]
    pub capture_errors: bool,

    #[serde(rename = "CaptureCrashes", default = "default_true")]
    pub capture_crashes: bool,

    #[serde(rename = "BeaconSizeInBytes")]
    pub beacon_size_in_bytes: i32,

    #[serde(rename = "SendIntervalMs")]
    pub send_interval_ms: i32,

    #[serde(rename = "Multiplicity", default = "default_multiplicity")]
    pub multiplicity: i32,

    #[serde(rename = "VisitStoreVersion", default = "default_visit_store_version")]
    pub visit_store_version: i32,

    #[serde(rename = "MaxEventsPerSession")]
    pub max_events_per_session: i32,

    #[serde(rename = "SessionTimeoutMs")]
    pub session_timeout_ms: i32,

    #[serde(rename = "SessionDurationMs")]
    pub session_duration_ms: i32,

    #[serde(rename = "ServerId", default)]
    pub server_id: i32,
}

fn default_true() -> bool {
    true
}

fn default_multiplicity() -> i32 {
    1
}

fn default_visit_store_version() -> i32 {
    1
}

impl ServerConfiguration {
    /// Effective chunk budget after reserving the safety margin.
    pub fn effective_beacon_size(&self, safety_margin: usize) -> usize {
        (self.beacon_size_in_bytes.max(0) as usize).saturating_sub(safety_margin)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.multiplicity >= 1, "Multiplicity must be >= 1");
        ensure!(
            self.beacon_size_in_bytes as usize > crate::protocol::DEFAULT_MIN_SAFETY_MARGIN,
            "BeaconSizeInBytes must exceed the minimum safety margin"
        );
        ensure!(self.send_interval_ms >= 0, "SendIntervalMs must be >= 0");
        Ok(())
    }
}

/// Runtime-only settings that do not map to any wire key.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(rename = "StatusRetryInitialDelayMs", default = "default_retry_delay")]
    pub status_retry_initial_delay_ms: u64,

    #[serde(rename = "StatusRetryMaxAttempts", default = "default_retry_attempts")]
    pub status_retry_max_attempts: u32,

    #[serde(rename = "CaptureOffPollIntervalMs", default = "default_capture_off_poll_ms")]
    pub capture_off_poll_interval_ms: u64,

    #[serde(rename = "MaxRecordAgeMs", default = "default_max_record_age_ms")]
    pub max_record_age_ms: i64,

    #[serde(rename = "CacheHighWaterMarkBytes", default = "default_high_water_mark")]
    pub cache_high_water_mark_bytes: i64,

    #[serde(rename = "CacheLowWaterMarkBytes", default = "default_low_water_mark")]
    pub cache_low_water_mark_bytes: i64,
}

fn default_retry_delay() -> u64 {
    1_000
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_capture_off_poll_ms() -> u64 {
    120_000
}

fn default_max_record_age_ms() -> i64 {
    10 * 60 * 1_000
}

fn default_high_water_mark() -> i64 {
    100 * 1024
}

fn default_low_water_mark() -> i64 {
    80 * 1024
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.open_kit.application_id.is_empty(),
            "ApplicationId must not be empty"
        );
        if self.open_kit.agent_version.is_empty() {
            self.open_kit.agent_version = env!("CARGO_PKG_VERSION").to_string();
        }
        self.server.validate()?;
        ensure!(
            self.runtime.cache_low_water_mark_bytes <= self.runtime.cache_high_water_mark_bytes,
            "CacheLowWaterMarkBytes must not exceed CacheHighWaterMarkBytes"
        );
        Ok(())
    }
}

/// A hot-swappable handle on the current [`ServerConfiguration`], plus a
/// single-slot update callback.
///
/// Readers call [`current`](Self::current) to get a cheap `Arc` snapshot;
/// writers call [`apply_patch`](Self::apply_patch) to replace the whole
/// sub-tree atomically and fire the callback synchronously afterwards.
pub struct ServerConfigurationHolder {
    current: ArcSwap<ServerConfiguration>,
    on_update: Mutex<Option<Box<dyn Fn(&ServerConfiguration) + Send + Sync>>>,
}

impl std::fmt::Debug for ServerConfigurationHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfigurationHolder")
            .field("current", &*self.current.load())
            .finish_non_exhaustive()
    }
}

impl ServerConfigurationHolder {
    pub fn new(initial: ServerConfiguration) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            on_update: Mutex::new(None),
        }
    }

    pub fn current(&self) -> std::sync::Arc<ServerConfiguration> {
        self.current.load_full()
    }

    /// Registers the callback invoked after every successful
    /// [`apply_patch`](Self::apply_patch). Replaces any previously
    /// registered callback.
    pub fn set_on_update<F>(&self, callback: F)
    where F: Fn(&ServerConfiguration) + Send + Sync + 'static {
        let mut slot = self.on_update.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(Box::new(callback));
    }

    /// Parses `body` as a JSON status-response patch and installs it.
    pub fn apply_patch_json(&self, body: &str) -> Result<(), crate::error::ConfigError> {
        let patch: ServerConfiguration =
            serde_json::from_str(body).map_err(|e| crate::error::ConfigError::Parse(e.to_string()))?;
        self.apply_patch(patch)
    }

    pub fn apply_patch(&self, patch: ServerConfiguration) -> Result<(), crate::error::ConfigError> {
        if patch.multiplicity < 1 {
            return Err(crate::error::ConfigError::InvalidField {
                field: "multiplicity",
                reason: "must be >= 1".to_string(),
            });
        }
        self.current.store(std::sync::Arc::new(patch));
        if let Some(cb) = self.on_update.lock().unwrap_or_else(|p| p.into_inner()).as_ref() {
            cb(&patch);
        }
        Ok(())
    }
}
