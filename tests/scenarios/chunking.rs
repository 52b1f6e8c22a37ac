// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A session whose queued data exceeds one chunk's byte budget is drained
//! across several HTTP requests: every body stays within the configured
//! budget, and every fragment is transmitted exactly once.

use std::sync::Arc;

use beacon_agent_core::cache::{BeaconCache, BeaconKey};

use super::common::{FakeClock, RecordingHttpClient, empty_params, make_assembler, parse_body, sample_server_config};

#[tokio::test]
async fn oversized_session_drains_into_several_bounded_chunks() {
    let cache = Arc::new(BeaconCache::new());
    let clock = FakeClock::starting_at(0);
    let beacon_size_in_bytes = 2_048;
    let assembler = make_assembler(
        &cache,
        BeaconKey::new(3, 0),
        beacon_agent_core::cfg::enums::DataCollectionLevel::UserBehavior,
        1,
        sample_server_config(true, beacon_size_in_bytes),
        Arc::clone(&clock),
    );

    let padding = "x".repeat(280);
    for i in 0..5 {
        clock.advance(1);
        assembler.report_value_string(0, "pad", Some(&format!("{padding}{i}")));
    }

    let client = RecordingHttpClient::always_ok();
    let response = assembler.send(&client, &empty_params()).await;
    assert!(response.is_some());
    assert!(assembler.is_empty(), "every queued fragment eventually drains");

    let bodies = client.bodies_as_strings();
    assert!(bodies.len() > 1, "a 2048-byte budget cannot hold five ~300-byte fragments in one request");

    let budget = (beacon_size_in_bytes as usize).saturating_sub(1024);
    let mut seen_values = Vec::new();
    for body in &bodies {
        assert!(body.len() <= budget, "chunk of {} bytes exceeds the {budget}-byte budget", body.len());
        let (_, events) = parse_body(body);
        for event in events {
            seen_values.push(event["vl"].clone());
        }
    }

    assert_eq!(seen_values.len(), 5, "all five fragments are transmitted, none dropped or duplicated");
    let mut unique = seen_values.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);
}
