// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Abstract collector transport.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::cfg::config::ServerConfiguration;

/// Extra key/value pairs appended to a request's query string. A
/// `BTreeMap` keeps iteration order stable, which matters for tests that
/// assert on an exact request line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(pub BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one HTTP round-trip to the collector.
///
/// A response is erroneous when `status_code >= 400` or a transport
/// error occurred before a status line was read (`status_code` is then
/// meaningless and should be treated as already covered by
/// `is_erroneous() == true`; implementations are not required to produce
/// a particular sentinel value in that case).
#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub status_code: u16,
    pub transport_error: bool,
    /// Server-configuration patch to install, parsed from the response
    /// body when present.
    pub server_configuration: Option<ServerConfiguration>,
}

impl StatusResponse {
    pub fn ok(server_configuration: Option<ServerConfiguration>) -> Self {
        Self { status_code: 200, transport_error: false, server_configuration }
    }

    pub fn transport_error() -> Self {
        Self { status_code: 0, transport_error: true, server_configuration: None }
    }

    pub fn error(status_code: u16) -> Self {
        Self { status_code, transport_error: false, server_configuration: None }
    }

    pub fn is_erroneous(&self) -> bool {
        self.transport_error || self.status_code >= 400
    }
}

/// The collector transport the core depends on. Implementations own
/// connection handling (TLS, redirects, retries below this layer); the
/// core treats every call as a single logical round-trip.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn send_status_request(&self, extra_params: &QueryParams) -> StatusResponse;

    async fn send_beacon_request(
        &self,
        client_ip: &str,
        body: Bytes,
        extra_params: &QueryParams,
    ) -> StatusResponse;
}
