// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed, library-boundary error enums.
//!
//! Most subsystem failures never reach a caller — the assembler swallows
//! privacy-gate misses and encoding failures into a logged no-op per the
//! propagation rules. These types exist for the handful of seams where a
//! caller can meaningfully branch on the failure kind.

use thiserror::Error;

/// Failure modes of the percent-encoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// The declared charset is unsupported; only UTF-8 is implemented.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// The input bytes are not valid UTF-8.
    #[error("input is not valid UTF-8")]
    InvalidUtf8,
}

/// Failure modes of mutating [`crate::cache::BeaconCache`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// A mutating operation was called with a key that has no cache entry.
    #[error("no cache entry for key {0:?}")]
    UnknownKey(crate::cache::BeaconKey),
}

/// Failure modes surfaced while installing a server-configuration patch.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The server sent a value outside the protocol's valid range.
    #[error("invalid server configuration field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The YAML/JSON document could not be parsed at all.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}
