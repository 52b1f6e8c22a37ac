// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! UTF-8 percent encoding with an extended reserved-character set.

use std::fmt::Write as _;

use crate::error::EncodingError;

/// Reserved set the assembler always passes so that `_` — used as a
/// separator inside web-request tags — is escaped inside user-supplied
/// values.
pub const UNDERSCORE_RESERVED: [char; 1] = ['_'];

#[inline]
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encodes `value` as UTF-8, escaping anything outside
/// `{A-Z, a-z, 0-9, '-', '.', '_', '~'}` plus every byte produced by a
/// character in `extra_reserved`.
///
/// Only fails if `value`'s encoding environment is unsupported; since Rust
/// strings are always valid UTF-8 this only ever returns `Ok`, but the
/// fallible signature is kept to mirror the source charset-negotiation
/// contract and give callers a single error type to match on.
pub fn percent_encode(value: &str, extra_reserved: &[char]) -> Result<String, EncodingError> {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if extra_reserved.contains(&ch) {
            let mut buf = [0u8; 4];
            for b in ch.encode_utf8(&mut buf).as_bytes() {
                write_escaped(&mut out, *b);
            }
            continue;
        }

        let mut buf = [0u8; 4];
        let bytes = ch.encode_utf8(&mut buf).as_bytes();
        if bytes.len() == 1 && is_unreserved(bytes[0]) {
            out.push(ch);
        } else {
            for b in bytes {
                write_escaped(&mut out, *b);
            }
        }
    }
    Ok(out)
}

/// Convenience wrapper that always reserves `_`, the encoding the
/// assembler uses for every string-valued field.
#[inline]
pub fn encode_reserved(value: &str) -> Result<String, EncodingError> {
    percent_encode(value, &UNDERSCORE_RESERVED)
}

#[inline]
fn write_escaped(out: &mut String, byte: u8) {
    // write! on a String never fails.
    let _ = write!(out, "%{byte:02X}");
}
