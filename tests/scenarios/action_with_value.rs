// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A finished action followed by a reported value. The action fragment
//! must precede the value fragment in the drained chunk (action data
//! drains before event data), and `t0`/`t1` on the action must reflect the
//! times passed in, not wall-clock reads.

use std::sync::Arc;

use beacon_agent_core::{
    beacon::ActionRecord,
    cache::{BeaconCache, BeaconKey},
    cfg::enums::DataCollectionLevel,
};

use super::common::{FakeClock, RecordingHttpClient, empty_params, make_assembler, parse_body, sample_server_config};

#[tokio::test]
async fn action_precedes_its_reported_value_in_the_drained_chunk() {
    let cache = Arc::new(BeaconCache::new());
    let clock = FakeClock::starting_at(0);
    let assembler =
        make_assembler(&cache, BeaconKey::new(7, 0), DataCollectionLevel::UserBehavior, 1, sample_server_config(true, 65_536), Arc::clone(&clock));

    // Four sequence numbers already handed out elsewhere in the session;
    // the action's own start/end sequence numbers are caller-supplied data
    // (add_action does not draw from the counter itself).
    for _ in 0..4 {
        assembler.create_sequence_number();
    }

    assembler.add_action(&ActionRecord {
        id: 3,
        parent_id: 0,
        name: "tap".to_string(),
        start_sequence_number: 4,
        end_sequence_number: 5,
        start_time_ms: 100,
        end_time_ms: 150,
    });
    // report_value_int draws its own sequence number internally: the 5th
    // call overall.
    assembler.report_value_int(3, "k", 7);

    let client = RecordingHttpClient::always_ok();
    assembler.send(&client, &empty_params()).await;

    let bodies = client.bodies_as_strings();
    assert_eq!(bodies.len(), 1);
    let (_, events) = parse_body(&bodies[0]);
    assert_eq!(events.len(), 2, "one action fragment, one value fragment");

    let action = &events[0];
    assert_eq!(action["et"], "1");
    assert_eq!(action["ca"], "3");
    assert_eq!(action["pa"], "0");
    assert_eq!(action["s0"], "4");
    assert_eq!(action["t0"], "100");
    assert_eq!(action["s1"], "5");
    assert_eq!(action["t1"], "50");

    let value = &events[1];
    assert_eq!(value["et"], "12");
    assert_eq!(value["na"], "k");
    assert_eq!(value["pa"], "3");
    assert_eq!(value["s0"], "5");
    assert_eq!(value["vl"], "7");
}
