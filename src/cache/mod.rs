// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The beacon cache: a thread-safe bounded store of serialised event
//! fragments, keyed by (session-number, session-sequence), supporting
//! chunked drain with rollback on transmission failure and time/size-based
//! eviction.

pub mod entry;
pub mod evictor;
pub mod fragment;
pub mod key;
pub mod store;

pub use entry::CacheEntry;
pub use evictor::{EvictionPolicy, run_eviction_pass};
pub use fragment::EventFragment;
pub use key::BeaconKey;
pub use store::BeaconCache;
