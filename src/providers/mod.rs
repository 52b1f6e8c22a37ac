// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Narrow capability traits the assembler and state machine depend on
//! instead of reaching for the ambient environment directly, plus the
//! default in-process implementations.

pub mod default;
pub mod traits;

pub use default::{DefaultRandomProvider, DefaultSessionIdProvider, DefaultThreadIdProvider, SystemTimingProvider};
pub use traits::{RandomProvider, SessionIdProvider, ThreadIdProvider, TimingProvider};
