// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Low-level fragment assembly: a preallocated `String` builder for
//! `key=value&...` tokens, plus the name-truncation and web-request-tag
//! rules shared by every event kind.

use std::fmt::Write as _;

use crate::protocol::MAX_NAME_LEN;

/// Accumulates `key=value` pairs joined by `&`, with no leading or
/// trailing delimiter — the shape a [`crate::cache::EventFragment`]
/// payload must have.
///
/// One `String::with_capacity` up front, no reallocation on the hot path
/// for a typical fragment.
pub struct FragmentBuilder {
    buf: String,
    wrote_any: bool,
}

impl FragmentBuilder {
    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: String::with_capacity(cap), wrote_any: false }
    }

    fn push_delim(&mut self) {
        if self.wrote_any {
            self.buf.push('&');
        }
        self.wrote_any = true;
    }

    /// Appends `key=value` with `value` used verbatim (already encoded,
    /// or known to need no encoding, e.g. a numeric literal).
    pub fn push_raw(&mut self, key: &str, value: &str) -> &mut Self {
        self.push_delim();
        self.buf.push_str(key);
        self.buf.push('=');
        self.buf.push_str(value);
        self
    }

    pub fn push_i64(&mut self, key: &str, value: i64) -> &mut Self {
        self.push_delim();
        let _ = write!(self.buf, "{key}={value}");
        self
    }

    pub fn push_f64(&mut self, key: &str, value: f64) -> &mut Self {
        self.push_delim();
        let _ = write!(self.buf, "{key}={value}");
        self
    }

    /// Appends `key=value` with `value` percent-encoded (reserved set
    /// `{'_'}`). Skipped entirely if encoding fails.
    pub fn push_encoded(&mut self, key: &str, value: &str) -> &mut Self {
        match crate::protocol::encode_reserved(value) {
            Ok(encoded) => {
                self.push_delim();
                self.buf.push_str(key);
                self.buf.push('=');
                self.buf.push_str(&encoded);
            },
            Err(err) => {
                tracing::warn!(key, error = %err, "dropping unencodable field");
            },
        }
        self
    }

    /// Appends `key=value` only if `value >= 0`, per the `bs`/`br`/`rc`
    /// omit-if-negative rule.
    pub fn push_i64_if_non_negative(&mut self, key: &str, value: i64) -> &mut Self {
        if value >= 0 {
            self.push_i64(key, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.wrote_any
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Trims leading/trailing whitespace then truncates to at most
/// [`MAX_NAME_LEN`] characters, applied before encoding.
pub fn truncate_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.chars().count() <= MAX_NAME_LEN {
        trimmed.to_string()
    } else {
        trimmed.chars().take(MAX_NAME_LEN).collect()
    }
}

/// Builds a web-request tag:
/// `MT_<protocolVersion>_<serverId>_<deviceId>_<sessionNumber>[-<sessionSequence>]_<percentEncodedAppId>_<parentActionId>_<threadId>_<tracerSeq>`
///. The session-sequence suffix is included only when
/// `visit_store_version > 1`.
#[allow(clippy::too_many_arguments)]
pub fn build_web_request_tag(
    protocol_version: i32,
    server_id: i32,
    device_id: i64,
    session_number: i32,
    session_sequence: i32,
    visit_store_version: i32,
    encoded_app_id: &str,
    parent_action_id: i32,
    thread_id: i64,
    tracer_seq: i32,
) -> String {
    let mut tag = String::with_capacity(64 + encoded_app_id.len());
    let _ = write!(tag, "MT_{protocol_version}_{server_id}_{device_id}_{session_number}");
    if visit_store_version > 1 {
        let _ = write!(tag, "-{session_sequence}");
    }
    let _ = write!(tag, "_{encoded_app_id}_{parent_action_id}_{thread_id}_{tracer_seq}");
    tag
}
