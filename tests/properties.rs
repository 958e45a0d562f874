//! Property-based checks over randomly sized ring networks (spec §8,
//! universal properties 2, 3, 5 and 7).
use hashgraph::{AddEventOutcome, AddressBook, Config, ConsensusRound, Hashgraph, Identity, RawEvent, UnsignedEvent};
use proptest::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, SystemTime};

fn run_ring(population: usize, ticks: usize) -> Vec<ConsensusRound> {
    let identities: Vec<Identity> = (0..population).map(|_| Identity::generate()).collect();
    let book = AddressBook::new(vec![1; population]).unwrap();
    let mut core = Hashgraph::initialise(
        book,
        Config::default(),
        0,
        0,
        hashgraph::Hash::from_bytes(&[0u8; 48]),
    )
    .unwrap();

    let mut last: Vec<Option<(hashgraph::Hash, i64)>> = vec![None; population];
    let mut clock = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let mut emitted = Vec::new();

    for _ in 0..ticks {
        clock += Duration::from_millis(1);
        let mut new_last = last.clone();
        for i in 0..population {
            let self_parent = last[i];
            let other_parent = last[(i + 1) % population];
            let raw: RawEvent =
                UnsignedEvent::new(i as u64, self_parent, other_parent, clock).sign(&identities[i]);
            let hash = *raw.hash();
            if let AddEventOutcome::Admitted(rounds) = core.add_event(raw).unwrap() {
                emitted.extend(rounds);
            }
            new_last[i] = Some((hash, 0));
        }
        last = new_last;
    }
    emitted
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn consensus_order_is_dense_and_strictly_increasing(population in 3usize..6, ticks in 10usize..40) {
        let rounds = run_ring(population, ticks);
        let mut expected = 0u64;
        for round in &rounds {
            for event in &round.events {
                let order = event.consensus_order().expect("finalised event must carry an order");
                prop_assert_eq!(order, expected);
                expected += 1;
            }
        }
    }

    #[test]
    fn consensus_timestamps_are_non_decreasing(population in 3usize..6, ticks in 10usize..40) {
        let rounds = run_ring(population, ticks);
        let mut last_ts = None;
        for round in &rounds {
            for event in &round.events {
                let ts = event.consensus_timestamp().expect("finalised event must carry a timestamp");
                if let Some(prev) = last_ts {
                    prop_assert!(ts >= prev);
                }
                last_ts = Some(ts);
            }
        }
    }

    #[test]
    fn judges_are_unique_per_round_and_creator(population in 3usize..6, ticks in 10usize..40) {
        let rounds = run_ring(population, ticks);
        for round in &rounds {
            let mut seen = HashSet::new();
            for hash in &round.judges {
                prop_assert!(seen.insert(*hash), "duplicate judge hash within a single round");
            }
        }
    }

    #[test]
    fn expiry_frontier_never_regresses(population in 3usize..6, ticks in 10usize..40) {
        let rounds = run_ring(population, ticks);
        let mut last_frontier = 0i64;
        for round in &rounds {
            prop_assert!(round.min_round_generation >= last_frontier);
            last_frontier = round.min_round_generation;
        }
    }
}
