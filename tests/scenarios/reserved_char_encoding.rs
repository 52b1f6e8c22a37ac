// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The assembler always reserves `_` when percent-encoding string fields,
//! because `_` is the web-request tag's own separator.

use std::sync::Arc;

use beacon_agent_core::cache::{BeaconCache, BeaconKey};

use super::common::{FakeClock, RecordingHttpClient, empty_params, make_assembler, parse_body, sample_server_config};

#[tokio::test]
async fn underscores_in_name_and_value_are_percent_encoded() {
    let cache = Arc::new(BeaconCache::new());
    let clock = FakeClock::starting_at(0);
    let assembler = make_assembler(
        &cache,
        BeaconKey::new(1, 0),
        beacon_agent_core::cfg::enums::DataCollectionLevel::UserBehavior,
        1,
        sample_server_config(true, 65_536),
        clock,
    );

    assembler.report_value_string(1, "a_b", Some("x_y"));

    let client = RecordingHttpClient::always_ok();
    assembler.send(&client, &empty_params()).await;

    let bodies = client.bodies_as_strings();
    let (_, events) = parse_body(&bodies[0]);
    assert_eq!(events.len(), 1);

    let event = &events[0];
    assert_eq!(event["na"], "a%5Fb");
    assert_eq!(event["vl"], "x%5Fy");
    assert!(!event["na"].contains('_'));
    assert!(!event["vl"].contains('_'));
}
