// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A transport error on `send()` must roll the in-flight chunk back into
//! the cache unchanged, so a retry transmits the same fragments again.

use std::sync::Arc;

use beacon_agent_core::{
    cache::{BeaconCache, BeaconKey},
    cfg::enums::DataCollectionLevel,
    http::StatusResponse,
};

use super::common::{FakeClock, RecordingHttpClient, empty_params, make_assembler, parse_body, sample_server_config};

#[tokio::test]
async fn transport_error_rolls_back_then_succeeds_on_retry() {
    let cache = Arc::new(BeaconCache::new());
    let clock = FakeClock::starting_at(0);
    let assembler = make_assembler(
        &cache,
        BeaconKey::new(9, 0),
        DataCollectionLevel::UserBehavior,
        1,
        sample_server_config(true, 65_536),
        Arc::clone(&clock),
    );

    assembler.report_value_int(0, "k1", 1);
    clock.advance(10);
    assembler.report_value_int(0, "k2", 2);

    let failing = RecordingHttpClient::with_responses(vec![StatusResponse::transport_error()]);
    let first = assembler.send(&failing, &empty_params()).await;
    assert!(first.expect("send still reports the erroneous response").is_erroneous());
    assert!(!assembler.is_empty(), "rolled-back fragments remain queued");

    let healthy = RecordingHttpClient::always_ok();
    let second = assembler.send(&healthy, &empty_params()).await;
    assert!(second.is_some());
    assert!(assembler.is_empty());

    let failing_bodies = failing.bodies_as_strings();
    let healthy_bodies = healthy.bodies_as_strings();
    assert_eq!(failing_bodies.len(), 1);
    assert_eq!(healthy_bodies.len(), 1);

    let (_, failed_events) = parse_body(&failing_bodies[0]);
    let (_, retried_events) = parse_body(&healthy_bodies[0]);
    assert_eq!(failed_events.len(), retried_events.len());

    for (failed, retried) in failed_events.iter().zip(retried_events.iter()) {
        for key in ["et", "na", "pa", "s0", "vl"] {
            assert_eq!(failed.get(key), retried.get(key), "field {key} differs between attempts");
        }
    }
}
