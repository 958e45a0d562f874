//! C6/C7/C8: consensus finalisation, the ingest pipeline, expiry and the
//! output stream (spec §4.6, §4.7, §4.8, §6).
use crate::address_book::AddressBook;
use crate::config::Config;
use crate::election::Elections;
use crate::error::{FatalError, RejectReason};
use crate::event::{Event, EventId, RawEvent};
use crate::graph::Graph;
use crate::hash::{Hash, Hasher, RunningHash};
use crate::round::RoundTable;
use crate::wire;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// A fully finalised round, handed to collaborators exactly once, in
/// strictly increasing `round` order (spec §5).
#[derive(Debug, Clone)]
pub struct ConsensusRound {
    /// The round number.
    pub round: i64,
    /// Events in this round, ordered by strictly increasing
    /// `consensus_order`.
    pub events: Vec<Arc<Event>>,
    /// The famous judges that decided this round, one per creator.
    pub judges: Vec<Hash>,
    /// The new expiry frontier: events with `generation < min_round_generation`
    /// may now be dropped.
    pub min_round_generation: i64,
}

/// Read-only snapshot for reconnect/state export (spec §6 `currentState`).
#[derive(Debug, Clone)]
pub struct ConsensusState {
    /// The highest round fully finalised so far.
    pub last_decided_round: i64,
    /// The current expiry frontier: events below this generation are
    /// eligible to be dropped.
    pub min_round_generation: i64,
    /// The running hash of the consensus stream as of `last_decided_round`.
    pub running_hash: Hash,
    /// Witness hashes recorded for the newest round still open.
    pub pending_witnesses: Vec<Hash>,
}

/// The non-wire-normative persisted form of a `ConsensusState`, suitable
/// for writing to the reconnect store (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PersistedState {
    /// The highest round fully finalised so far.
    pub last_decided_round: i64,
    /// The current expiry frontier: events below this generation are
    /// eligible to be dropped.
    pub min_round_generation: i64,
    /// The running hash of the consensus stream, as raw digest bytes.
    pub running_hash: [u8; crate::hash::HASH_LENGTH],
    /// Witness hashes recorded for the newest round still open, as raw
    /// digest bytes.
    pub pending_witnesses: Vec<[u8; crate::hash::HASH_LENGTH]>,
}

impl From<&ConsensusState> for PersistedState {
    fn from(state: &ConsensusState) -> Self {
        Self {
            last_decided_round: state.last_decided_round,
            min_round_generation: state.min_round_generation,
            running_hash: *state.running_hash.as_bytes(),
            pending_witnesses: state
                .pending_witnesses
                .iter()
                .map(|h| *h.as_bytes())
                .collect(),
        }
    }
}

impl PersistedState {
    /// The running hash to resume `Hashgraph::initialise` from.
    pub fn running_hash(&self) -> Hash {
        Hash::from_bytes(&self.running_hash)
    }
}

/// An on-disk store for `PersistedState`, backed by `sled`. One key per
/// address-book epoch, so a collaborator can keep a handful of recent
/// checkpoints around for reconnecting peers.
pub struct PersistedStateStore(sled::Db);

impl PersistedStateStore {
    /// Opens (creating if absent) a persisted-state store at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::Error> {
        Ok(Self(sled::open(path)?))
    }

    /// Writes a snapshot under `key`, overwriting any prior value.
    pub fn save(&self, key: &[u8], state: &PersistedState) -> Result<(), crate::error::Error> {
        let bytes = bincode::serialize(state)?;
        self.0.insert(key, bytes)?;
        self.0.flush()?;
        Ok(())
    }

    /// Reads back a previously saved snapshot, if any.
    pub fn load(&self, key: &[u8]) -> Result<Option<PersistedState>, crate::error::Error> {
        match self.0.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// The result of a single `add_event` call.
#[derive(Debug)]
pub enum AddEventOutcome {
    /// The event was admitted. Zero or more rounds may have reached
    /// consensus as a result.
    Admitted(Vec<ConsensusRound>),
    /// The event was not admitted; see `RejectReason` for why. This is not
    /// an error — duplicates and stale events are expected gossip noise.
    Rejected(RejectReason),
}

type RoundListener = Box<dyn FnMut(&ConsensusRound) + Send>;
type MinGenListener = Box<dyn FnMut(i64) + Send>;

/// The hashgraph consensus core: ingests events from a gossip layer and
/// emits finalised, totally ordered `ConsensusRound`s.
///
/// Per spec §5, every mutating method here is meant to run on a single
/// logical thread; nothing here is internally synchronised.
pub struct Hashgraph {
    book: AddressBook,
    config: Config,
    graph: Graph,
    rounds: RoundTable,
    elections: Elections,
    next_consensus_order: u64,
    last_consensus_timestamp: Option<SystemTime>,
    running_hash: RunningHash,
    min_round_generation: i64,
    last_decided_round: i64,
    on_round: Vec<RoundListener>,
    on_min_gen: Vec<MinGenListener>,
    /// Latched once a `FatalError` escapes `add_event`; from then on every
    /// mutating call refuses outright instead of running on state that may
    /// already be inconsistent (spec §7).
    fatal: Option<FatalError>,
}

impl Hashgraph {
    /// Sets up the core from a loaded (or genesis) state (spec §6
    /// `initialise`).
    pub fn initialise(
        book: AddressBook,
        config: Config,
        starting_round: i64,
        starting_min_generation: i64,
        starting_running_hash: Hash,
    ) -> Result<Self, FatalError> {
        if book.size() == 0 {
            return Err(FatalError::InvalidAddressBook("empty address book"));
        }
        if !config.is_valid() {
            return Err(FatalError::InvalidAddressBook(
                "coin_round_frequency must exceed 2 and retained_rounds_window must be positive",
            ));
        }
        Ok(Self {
            graph: Graph::new(book.size()),
            book,
            config,
            rounds: RoundTable::new(),
            elections: Elections::new(),
            next_consensus_order: 0,
            last_consensus_timestamp: None,
            running_hash: RunningHash::from_hash(starting_running_hash),
            min_round_generation: starting_min_generation,
            last_decided_round: starting_round,
            on_round: Vec::new(),
            on_min_gen: Vec::new(),
            fatal: None,
        })
    }

    /// Registers a listener invoked once, in order, for every finalised
    /// round (spec §6 `onConsensusRound`).
    pub fn on_consensus_round(&mut self, listener: impl FnMut(&ConsensusRound) + Send + 'static) {
        self.on_round.push(Box::new(listener));
    }

    /// Registers a listener invoked whenever the expiry frontier advances
    /// (spec §6 `onMinGenerationAdvanced`).
    pub fn on_min_generation_advanced(&mut self, listener: impl FnMut(i64) + Send + 'static) {
        self.on_min_gen.push(Box::new(listener));
    }

    /// A read-only snapshot suitable for reconnect/state export.
    pub fn current_state(&self) -> ConsensusState {
        let pending_witnesses = self
            .rounds
            .get(self.rounds.max_round())
            .map(|r| {
                r.witnesses()
                    .iter()
                    .filter_map(|&w| self.graph.event(w))
                    .map(|e| *e.hash())
                    .collect()
            })
            .unwrap_or_default();
        ConsensusState {
            last_decided_round: self.last_decided_round,
            min_round_generation: self.min_round_generation,
            running_hash: self.running_hash.value(),
            pending_witnesses,
        }
    }

    /// The address book this core was initialised with.
    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    /// Looks up an admitted event by its base hash. Returns `None` once the
    /// event has expired or if it was never admitted.
    pub fn event(&self, hash: &Hash) -> Option<&Event> {
        self.graph.event_by_hash(hash)
    }

    /// The single entry point for new events (spec §4.8). Once a
    /// `FatalError` has escaped from any call, every further call refuses
    /// immediately with that same error rather than mutating state that may
    /// already be inconsistent (spec §7).
    pub fn add_event(&mut self, raw: RawEvent) -> Result<AddEventOutcome, FatalError> {
        if let Some(fatal) = self.fatal {
            return Err(fatal);
        }
        match self.add_event_inner(raw) {
            Ok(outcome) => Ok(outcome),
            Err(fatal) => {
                self.fatal = Some(fatal);
                Err(fatal)
            }
        }
    }

    fn add_event_inner(&mut self, raw: RawEvent) -> Result<AddEventOutcome, FatalError> {
        let self_parent_round = raw
            .self_parent()
            .and_then(|h| self.graph.event_by_hash(h))
            .map(|e| e.round_created());
        let other_parent_round = raw
            .other_parent()
            .and_then(|h| self.graph.event_by_hash(h))
            .map(|e| e.round_created());

        let id = match self.graph.insert(raw, self.min_round_generation) {
            Ok(id) => id,
            Err(reason) => {
                match reason {
                    RejectReason::DuplicateEvent => debug!("duplicate event rejected"),
                    RejectReason::StaleEvent => debug!("stale event rejected"),
                    RejectReason::UnknownParent => debug!("event with unknown parent rejected"),
                }
                return Ok(AddEventOutcome::Rejected(reason));
            }
        };

        let round_created = crate::round::compute_round_created(
            &self.graph,
            &self.book,
            &self.rounds,
            id,
            self_parent_round,
            other_parent_round,
        );
        let self_parent_round_created = self
            .graph
            .event(id)
            .unwrap()
            .self_parent_id()
            .and_then(|p| self.graph.event(p))
            .map(|e| e.round_created());
        let is_witness = match self_parent_round_created {
            Some(parent_round) => round_created > parent_round,
            None => true,
        };

        {
            let event = self.graph.event_mut(id).unwrap();
            event.round_created = round_created;
            event.is_witness = is_witness;
        }

        let mut rounds_with_decisions: BTreeSet<i64> = BTreeSet::new();
        if is_witness {
            self.rounds.add_witness(
                round_created,
                id,
                self.graph.event(id).unwrap().generation(),
            );
            self.elections.open(id, round_created);

            let decisions = self.elections.process_new_witness(
                &self.graph,
                &self.book,
                &self.config,
                id,
                round_created,
            );
            for decision in &decisions {
                let event = self.graph.event_mut(decision.witness).unwrap();
                event.fame = if decision.famous {
                    crate::event::Fame::Yes
                } else {
                    crate::event::Fame::No
                };
                rounds_with_decisions.insert(decision.round);
            }
        }

        let mut emitted = Vec::new();
        for round in rounds_with_decisions {
            emitted.extend(self.try_finalise_from(round)?);
        }
        Ok(AddEventOutcome::Admitted(emitted))
    }

    /// Finalises every consecutive round starting at `from` whose witnesses
    /// are all decided, stopping at the first undecided one. Rounds must be
    /// finalised strictly in order (spec §5).
    fn try_finalise_from(&mut self, from: i64) -> Result<Vec<ConsensusRound>, FatalError> {
        let mut emitted = Vec::new();
        let mut round = (self.last_decided_round + 1).max(from);
        loop {
            let round_data = match self.rounds.get(round) {
                Some(r) => r.clone(),
                None => break,
            };
            if round_data.witnesses().is_empty() {
                break;
            }
            let all_decided = round_data
                .witnesses()
                .iter()
                .all(|&w| self.graph.event(w).unwrap().fame().is_decided());
            if !all_decided {
                break;
            }
            emitted.push(self.finalise_round(round, &round_data)?);
            round += 1;
        }
        Ok(emitted)
    }

    fn finalise_round(
        &mut self,
        round: i64,
        round_data: &crate::round::RoundData,
    ) -> Result<ConsensusRound, FatalError> {
        // Judges: per creator, the famous witness with the lexicographically
        // smallest hash (spec §4.5). Forked creators may have several
        // famous witnesses; only that one counts.
        use std::collections::HashMap;
        let mut best_per_creator: HashMap<u64, EventId> = HashMap::new();
        for &w in round_data.witnesses() {
            let event = self.graph.event(w).unwrap();
            if !event.fame().is_yes() {
                continue;
            }
            best_per_creator
                .entry(event.creator())
                .and_modify(|cur| {
                    if event.hash() < self.graph.event(*cur).unwrap().hash() {
                        *cur = w;
                    }
                })
                .or_insert(w);
        }
        let mut judges: Vec<EventId> = best_per_creator.into_values().collect();
        judges.sort_by_key(|&j| *self.graph.event(j).unwrap().hash());
        for &j in &judges {
            self.graph.event_mut(j).unwrap().is_judge = true;
        }
        let judge_hashes: Vec<Hash> = judges
            .iter()
            .map(|&j| *self.graph.event(j).unwrap().hash())
            .collect();

        if judges.is_empty() {
            return Err(FatalError::InvariantViolation(
                "round decided with no famous judges",
            ));
        }

        // Round-received assignment: every not-yet-finalised event that is
        // an ancestor of every judge (spec §4.6 step 2).
        let mut to_receive: Vec<EventId> = Vec::new();
        for event in self.graph.all_live_events() {
            if event.is_finalised() {
                continue;
            }
            if judges
                .iter()
                .all(|&j| self.graph.is_ancestor(event.id(), j))
            {
                to_receive.push(event.id());
            }
        }

        // Whitening value for this round's tie-break: a deterministic
        // function of the round number and the running hash as of the
        // start of this round's finalisation (spec §9).
        let whitening = {
            let mut hasher = Hasher::new();
            hasher.write(&round.to_be_bytes());
            hasher.write(self.running_hash.value().as_bytes());
            hasher.sum()
        };

        // Consensus timestamp per event: upper median of each judge's
        // earliest self-ancestor descending from the event (spec §4.6 step
        // 3). This median, and the sort below, are pure functions of the
        // DAG's content, so they do not depend on admission order.
        let mut medians: Vec<(EventId, SystemTime)> = Vec::with_capacity(to_receive.len());
        for &e in &to_receive {
            let mut samples: Vec<(u64, SystemTime)> = Vec::with_capacity(judges.len());
            for &j in &judges {
                let a = self.earliest_self_ancestor_descending_from(j, e)?;
                let creator = self.graph.event(j).unwrap().creator();
                samples.push((creator, self.graph.event(a).unwrap().creation_time()));
            }
            samples.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
            let median = samples[samples.len() / 2].1;
            medians.push((e, median));
        }

        // Consensus order: (median timestamp, whitened hash, raw hash)
        // (spec §4.6 step 4). Sorting on the DAG-pure median, rather than
        // any bumped timestamp, keeps this order independent of admission
        // order; the non-decreasing bump is then applied below strictly in
        // this emitted order, so it too depends only on the DAG.
        medians.sort_by(|&(ea, ta), &(eb, tb)| {
            let ha = *self.graph.event(ea).unwrap().hash();
            let hb = *self.graph.event(eb).unwrap().hash();
            ta.cmp(&tb)
                .then_with(|| ha.xor(&whitening).cmp(&hb.xor(&whitening)))
                .then_with(|| ha.cmp(&hb))
        });

        let mut events = Vec::with_capacity(medians.len());
        for (id, median) in medians {
            let mut ts = median;
            if let Some(prev) = self.last_consensus_timestamp {
                if ts <= prev {
                    ts = prev + std::time::Duration::from_nanos(1);
                }
            }
            self.last_consensus_timestamp = Some(ts);

            let order = self.next_consensus_order;
            self.next_consensus_order += 1;
            let event_hash = *self.graph.event(id).unwrap().hash();
            let (secs, nanos) = wire::split_time(ts);
            {
                let event = self.graph.event_mut(id).unwrap();
                event.round_received = Some(round);
                event.consensus_timestamp = Some(ts);
                event.consensus_order = Some(order);
            }
            self.running_hash.extend(&event_hash, order, secs, nanos);
            events.push(Arc::new(self.graph.event(id).unwrap().clone()));
        }

        let min_round_generation = judges
            .iter()
            .map(|&j| self.graph.event(j).unwrap().generation())
            .min()
            .unwrap_or(self.min_round_generation);
        if min_round_generation > self.min_round_generation {
            self.min_round_generation = min_round_generation;
            self.expire_below(min_round_generation);
            for cb in &mut self.on_min_gen {
                cb(min_round_generation);
            }
        }

        self.last_decided_round = round;
        self.rounds.retire_through(round);

        let consensus_round = ConsensusRound {
            round,
            events,
            judges: judge_hashes,
            min_round_generation: self.min_round_generation,
        };
        info!(round, events = consensus_round.events.len(), "round finalised");
        for cb in &mut self.on_round {
            cb(&consensus_round);
        }
        Ok(consensus_round)
    }

    /// The earliest self-ancestor of `judge` that is itself a descendant of
    /// `event` (spec §4.6 step 3, `a(j, e)`). Descendant-of-`event` is
    /// monotone along the self-ancestor chain towards `judge`, so the match
    /// closest to `event` is the last one found walking backwards from
    /// `judge`.
    fn earliest_self_ancestor_descending_from(
        &self,
        judge: EventId,
        event: EventId,
    ) -> Result<EventId, FatalError> {
        let mut candidate = None;
        for ancestor in self.graph.self_ancestors(judge) {
            if self.graph.is_ancestor(event, ancestor) {
                candidate = Some(ancestor);
            } else if candidate.is_some() {
                break;
            }
        }
        candidate.ok_or(FatalError::InvariantViolation(
            "judge does not descend from an event it was required to receive",
        ))
    }

    fn expire_below(&mut self, min_generation: i64) {
        let expired: Vec<EventId> = self
            .graph
            .all_live_events()
            .filter(|e| e.is_finalised() && e.generation() < min_generation)
            .map(|e| e.id())
            .collect();
        for id in expired {
            self.graph.expire(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::Identity;
    use crate::event::{Fame, UnsignedEvent};
    use crate::round::RoundTable;
    use std::time::Duration;

    fn raw(creator: u64, time: SystemTime, id: &Identity) -> RawEvent {
        UnsignedEvent::new(creator, None, None, time).sign(id)
    }

    #[test]
    fn forked_creator_picks_lowest_hash_famous_witness_as_judge() {
        // Spec S3: a forked creator can have more than one famous witness
        // in the same round; only the lexicographically smallest-hash one
        // becomes the judge (spec §4.5), the rest are excluded even
        // though they decided famous too. Fame is set directly here
        // rather than via a driven election, since the tie-break itself
        // is what's under test.
        let book = AddressBook::new(vec![1, 1]).unwrap();
        let mut hg =
            Hashgraph::initialise(book, Config::default(), 0, 0, Hash::from_bytes(&[0u8; 48]))
                .unwrap();
        let a = Identity::generate();
        let b = Identity::generate();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);

        let id1 = hg.graph.insert(raw(0, t0, &a), 0).unwrap();
        let id2 = hg.graph.insert(raw(0, t0 + Duration::from_millis(1), &a), 0).unwrap();
        let id_b = hg.graph.insert(raw(1, t0, &b), 0).unwrap();

        for &id in &[id1, id2, id_b] {
            let event = hg.graph.event_mut(id).unwrap();
            event.is_witness = true;
            event.fame = Fame::Yes;
        }

        let mut table = RoundTable::new();
        table.add_witness(1, id1, 1);
        table.add_witness(1, id2, 1);
        table.add_witness(1, id_b, 1);
        let round_data = table.get(1).unwrap().clone();

        let round = hg.finalise_round(1, &round_data).unwrap();
        assert_eq!(round.judges.len(), 2);

        let (lower, higher) = if hg.graph.event(id1).unwrap().hash() < hg.graph.event(id2).unwrap().hash()
        {
            (id1, id2)
        } else {
            (id2, id1)
        };
        assert!(hg.graph.event(lower).unwrap().is_judge());
        assert!(!hg.graph.event(higher).unwrap().is_judge());
        assert!(hg.graph.event(id_b).unwrap().is_judge());
    }
}
