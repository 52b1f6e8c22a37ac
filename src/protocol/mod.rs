// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire-level protocol constants and the percent-encoder that turns typed
//! values into the delimited key/value beacon format.

pub mod constants;
pub mod percent_encode;

pub use constants::*;
pub use percent_encode::{encode_reserved, percent_encode};
