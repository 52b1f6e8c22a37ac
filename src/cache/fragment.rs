// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One serialised event's key/value payload, plus the timestamp used for
//! age-based eviction ordering.

/// A single buffered fragment: a well-formed, already percent-encoded
/// key/value string without leading/trailing delimiter, stamped with the
/// wall-clock millisecond it was appended at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFragment {
    pub timestamp_ms: i64,
    pub payload: String,
}

impl EventFragment {
    pub fn new(timestamp_ms: i64, payload: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            payload: payload.into(),
        }
    }

    /// Encoded length in bytes; the cache's size accounting always uses
    /// this rather than re-deriving it from the string (the cache never
    /// rewrites a payload).
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }
}
