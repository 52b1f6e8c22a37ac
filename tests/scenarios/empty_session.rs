// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A session with no actions or events still emits exactly its start/end
//! pair, in order, with `pa=0` and monotonically increasing sequence
//! numbers.

use std::sync::Arc;

use beacon_agent_core::cache::{BeaconCache, BeaconKey};

use super::common::{FakeClock, RecordingHttpClient, empty_params, make_assembler, parse_body, sample_server_config};

#[tokio::test]
async fn start_then_end_session_emits_two_ordered_fragments() {
    let cache = Arc::new(BeaconCache::new());
    let clock = FakeClock::starting_at(1_000);
    let assembler = make_assembler(
        &cache,
        BeaconKey::new(42, 0),
        beacon_agent_core::cfg::enums::DataCollectionLevel::UserBehavior,
        1,
        sample_server_config(true, 65_536),
        Arc::clone(&clock),
    );

    assembler.start_session();
    clock.advance(50);
    assembler.end_session();

    let client = RecordingHttpClient::always_ok();
    let response = assembler.send(&client, &empty_params()).await;
    assert!(response.is_some());

    let bodies = client.bodies_as_strings();
    assert_eq!(bodies.len(), 1, "two small fragments fit in a single chunk");

    let (_, events) = parse_body(&bodies[0]);
    assert_eq!(events.len(), 2);

    assert_eq!(events[0]["et"], "18");
    assert_eq!(events[0]["pa"], "0");
    assert_eq!(events[0]["s0"], "1");
    assert_eq!(events[0]["t0"], "0");

    assert_eq!(events[1]["et"], "19");
    assert_eq!(events[1]["pa"], "0");
    assert_eq!(events[1]["s0"], "2");
    let t0: i64 = events[1]["t0"].parse().expect("t0 is numeric");
    assert!(t0 >= 0);

    assert!(assembler.is_empty());
}
