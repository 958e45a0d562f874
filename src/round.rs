//! C4: round table and round-created assignment (spec §4.3).
use crate::address_book::{AddressBook, NodeId};
use crate::event::EventId;
use crate::graph::Graph;
use std::collections::{BTreeMap, HashSet};

/// Per-round bookkeeping: the witnesses admitted so far in this round and
/// the minimum generation among them.
#[derive(Debug, Default, Clone)]
pub struct RoundData {
    witnesses: Vec<EventId>,
    min_generation: i64,
}

impl RoundData {
    /// Witnesses admitted in this round so far, in admission order. Forked
    /// creators may contribute more than one.
    pub fn witnesses(&self) -> &[EventId] {
        &self.witnesses
    }

    /// Minimum generation among this round's witnesses.
    pub fn min_generation(&self) -> i64 {
        self.min_generation
    }

    fn push(&mut self, id: EventId, generation: i64) {
        self.witnesses.push(id);
        self.min_generation = if self.witnesses.len() == 1 {
            generation
        } else {
            self.min_generation.min(generation)
        };
    }
}

/// The set of rounds currently tracked: from the oldest not-yet-finalised
/// round up to the newest round any admitted event belongs to.
#[derive(Debug, Default)]
pub struct RoundTable {
    rounds: BTreeMap<i64, RoundData>,
}

impl RoundTable {
    /// An empty round table.
    pub fn new() -> Self {
        Self {
            rounds: BTreeMap::new(),
        }
    }

    /// The round data for `round`, if any witness has been recorded for it.
    pub fn get(&self, round: i64) -> Option<&RoundData> {
        self.rounds.get(&round)
    }

    /// Records a newly admitted witness.
    pub fn add_witness(&mut self, round: i64, id: EventId, generation: i64) {
        self.rounds.entry(round).or_default().push(id, generation);
    }

    /// The highest round with any recorded witness, or 0 if none yet.
    pub fn max_round(&self) -> i64 {
        self.rounds.keys().next_back().copied().unwrap_or(0)
    }

    /// Drops all bookkeeping for rounds `<= round` (called once they are
    /// finalised; spec §4.7 expiry).
    pub fn retire_through(&mut self, round: i64) {
        self.rounds = self.rounds.split_off(&(round + 1));
    }
}

/// Computes `roundCreated(e)` for a newly admitted, non-witness-classified
/// event, per spec §4.3:
///
/// 1. `rp = max(selfParent.roundCreated, otherParent.roundCreated)`
///    (treating absent parents as round 1).
/// 2. `candidates` = creators of round-`rp` witnesses `e` strongly sees.
/// 3. If `candidates` form a supermajority of stake, `round = rp + 1`;
///    otherwise `round = rp`.
pub fn compute_round_created(
    graph: &Graph,
    book: &AddressBook,
    table: &RoundTable,
    event: EventId,
    self_parent_round: Option<i64>,
    other_parent_round: Option<i64>,
) -> i64 {
    let rp = self_parent_round
        .into_iter()
        .chain(other_parent_round)
        .max()
        .unwrap_or(1)
        .max(1);

    let candidates: HashSet<NodeId> = match table.get(rp) {
        Some(round_data) => round_data
            .witnesses()
            .iter()
            .filter(|&&w| graph.strongly_sees(event, w, book))
            .map(|&w| graph.event(w).unwrap().creator())
            .collect(),
        None => HashSet::new(),
    };
    let stake: u64 = candidates.iter().map(|&c| book.stake(c)).sum();
    if book.is_supermajority(stake) {
        rp + 1
    } else {
        rp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retire_through_drops_old_rounds() {
        let mut table = RoundTable::new();
        table.add_witness(1, EventId(0), 1);
        table.add_witness(2, EventId(1), 2);
        table.add_witness(3, EventId(2), 3);
        table.retire_through(2);
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_none());
        assert!(table.get(3).is_some());
    }

    #[test]
    fn min_generation_tracks_minimum() {
        let mut table = RoundTable::new();
        table.add_witness(1, EventId(0), 5);
        table.add_witness(1, EventId(1), 3);
        table.add_witness(1, EventId(2), 7);
        assert_eq!(table.get(1).unwrap().min_generation(), 3);
    }
}
