//! Chaos tests: storage faults must never break routing.
//!
//! `ChaoticStorage` fails a seeded fraction of operations. Routing outcomes
//! (who receives what) must be identical to a fault-free run; only history
//! persistence may be lost.

use std::time::Instant;

use parlor_server::{
    ChaoticStorage, DriverConfig, Environment, MemoryStorage, ServerAction, ServerDriver,
    ServerEvent, Storage,
    storage::{MESSAGES_TABLE, record},
};
use proptest::prelude::*;

#[derive(Clone)]
struct FixedEnv {
    start: Instant,
}

impl Environment for FixedEnv {
    fn now(&self) -> Instant {
        self.start
    }

    fn wall_clock_secs(&self) -> u64 {
        1_700_000_000
    }
}

/// Lines that never depend on storage to route.
fn storage_free_lines() -> impl Strategy<Value = Vec<(u64, String)>> {
    let line = prop_oneof![
        "[a-z]{1,8}",
        ("[a-z]{1,8}", 0usize..6).prop_map(|(s, i)| format!("{s} /to {i}")),
        ("[a-z]{1,8}", "[a-b]").prop_map(|(s, k)| format!("{s} /room {k}")),
    ];
    prop::collection::vec((1u64..=4, line), 1..40)
}

fn run<S: Storage>(storage: S, lines: &[(u64, String)]) -> Vec<(u64, String)> {
    let env = FixedEnv { start: Instant::now() };
    let mut driver = ServerDriver::new(env, storage, DriverConfig::default());
    let mut delivered = Vec::new();

    for id in 1..=4 {
        driver
            .process_event(ServerEvent::ConnectionAccepted {
                connection_id: id,
                peer_addr: format!("10.0.0.{id}:9000"),
            })
            .unwrap();
    }
    // Join replies carry the durable room id, so they stay out of the comparison
    for (command, id) in [("/join a", 1), ("/join a", 2), ("/join b", 3)] {
        driver
            .process_event(ServerEvent::LineReceived { connection_id: id, line: command.to_string() })
            .unwrap();
    }

    for (sender, line) in lines {
        let actions = driver
            .process_event(ServerEvent::LineReceived { connection_id: *sender, line: line.clone() })
            .unwrap();
        for action in actions {
            if let ServerAction::SendToConnection { connection_id, payload } = action {
                delivered.push((connection_id, payload));
            }
        }
    }

    delivered
}

#[test]
fn prop_routing_unaffected_by_storage_faults() {
    proptest!(|(
        failure_rate in 0.0..=1.0,
        seed in any::<u64>(),
        lines in storage_free_lines(),
    )| {
        let baseline = run(MemoryStorage::new(), &lines);
        let chaotic = run(ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed), &lines);

        prop_assert_eq!(baseline, chaotic);
    });
}

#[test]
fn prop_chaotic_inserts_are_all_or_nothing() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        count in 1usize..60,
    )| {
        let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let mut assigned = Vec::new();

        for n in 0..count {
            if let Ok(id) = storage.insert(MESSAGES_TABLE, &record([("n", n as u64)])) {
                assigned.push(id);
            }
        }

        // Ids strictly increase and every successful insert is readable
        prop_assert!(assigned.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(storage.inner().row_count(MESSAGES_TABLE), assigned.len());
    });
}

#[test]
fn history_survives_partial_faults() {
    let storage = ChaoticStorage::with_seed(MemoryStorage::new(), 0.3, 42);
    let env = FixedEnv { start: Instant::now() };
    let mut driver = ServerDriver::new(env, storage.clone(), DriverConfig::default());

    driver
        .process_event(ServerEvent::ConnectionAccepted {
            connection_id: 1,
            peer_addr: "10.0.0.1:9000".to_string(),
        })
        .unwrap();
    driver
        .process_event(ServerEvent::LineReceived { connection_id: 1, line: "/join a".to_string() })
        .unwrap();

    for n in 0..50 {
        let actions = driver
            .process_event(ServerEvent::LineReceived {
                connection_id: 1,
                line: format!("m{n} /room a"),
            })
            .unwrap();

        // The sender is a member, so every message is delivered regardless of storage
        assert!(actions.iter().any(|a| matches!(
            a,
            ServerAction::SendToConnection { connection_id: 1, payload } if *payload == format!("m{n}\n\r")
        )));
    }

    // Whatever was persisted is stored in send order
    let rows = storage.inner().fetch_all(MESSAGES_TABLE, &["content"]).unwrap();
    let contents: Vec<u64> = rows
        .iter()
        .filter_map(|row| row[0].as_text().and_then(|c| c.trim_start_matches('m').parse().ok()))
        .collect();
    assert!(contents.windows(2).all(|w| w[0] < w[1]));
}
