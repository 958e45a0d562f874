//! C2/C3: the in-memory DAG index, ancestor/self-ancestor relations and the
//! see/strongly-see predicates (spec §4.2, §4.4).
use crate::address_book::{AddressBook, NodeId};
use crate::error::{FatalError, RejectReason};
use crate::event::{Event, EventId, Fame, RawEvent};
use crate::hash::Hash;
use std::collections::{HashMap, HashSet};

/// The gossip graph: every admitted event, indexed by hash and by compact
/// id, with the reverse edges and caches needed to answer ancestor and
/// visibility queries in (amortised) O(1).
#[derive(Debug)]
pub struct Graph {
    by_hash: HashMap<Hash, EventId>,
    events: Vec<Option<Event>>,
    children: Vec<Vec<EventId>>,
    self_children: Vec<Vec<EventId>>,
    by_creator: Vec<Vec<EventId>>,
    self_seq: Vec<u32>,
    /// Full ancestor set per event, computed once at insertion time and
    /// reused for every subsequent query (spec §4.2: "amortised O(1) ...
    /// using per-event short-circuit marks"). Cleared on expiry.
    ancestors: Vec<Option<HashSet<EventId>>>,
}

impl Graph {
    /// Builds an empty graph sized for an address book with `population`
    /// nodes.
    pub fn new(population: usize) -> Self {
        Self {
            by_hash: HashMap::new(),
            events: Vec::new(),
            children: Vec::new(),
            self_children: Vec::new(),
            by_creator: vec![Vec::new(); population],
            self_seq: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    /// Resolves a hash to its compact id, if the event is in the graph
    /// (and has not been expired).
    pub fn resolve(&self, hash: &Hash) -> Option<EventId> {
        self.by_hash.get(hash).copied()
    }

    /// Whether an event with this hash has ever been admitted, including
    /// already-expired ones (used for `DuplicateEvent` detection, which
    /// must not be fooled by expiry).
    pub fn was_ever_admitted(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Looks up an event by its compact id. Returns `None` if the event has
    /// been expired.
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.index())?.as_ref()
    }

    /// Mutable lookup, for writing derived fields.
    pub fn event_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(id.index())?.as_mut()
    }

    /// Looks up an event by hash.
    pub fn event_by_hash(&self, hash: &Hash) -> Option<&Event> {
        self.resolve(hash).and_then(|id| self.event(id))
    }

    fn ancestor_set(&self, id: EventId) -> &HashSet<EventId> {
        self.ancestors[id.index()]
            .as_ref()
            .expect("ancestor set missing for a live event")
    }

    /// Validates and inserts a new raw event, computing its generation and
    /// wiring it into the reverse-edge and ancestor caches.
    ///
    /// Does not assign `round_created`/`is_witness`/fame — those are the
    /// round table and election's job (spec §4.3, §4.5), run by the ingest
    /// pipeline right after this returns.
    pub fn insert(&mut self, raw: RawEvent, min_generation: i64) -> Result<EventId, RejectReason> {
        if self.was_ever_admitted(&raw.hash) {
            return Err(RejectReason::DuplicateEvent);
        }
        let self_parent_id = match &raw.self_parent {
            Some(h) => Some(self.resolve(h).ok_or(RejectReason::UnknownParent)?),
            None => None,
        };
        let other_parent_id = match &raw.other_parent {
            Some(h) => Some(self.resolve(h).ok_or(RejectReason::UnknownParent)?),
            None => None,
        };

        let self_parent_generation = self_parent_id.map(|id| self.event(id).unwrap().generation());
        let other_parent_generation =
            other_parent_id.map(|id| self.event(id).unwrap().generation());
        let generation = match (self_parent_generation, other_parent_generation) {
            (None, None) => 1,
            (Some(a), None) => a + 1,
            (None, Some(b)) => b + 1,
            (Some(a), Some(b)) => a.max(b) + 1,
        };
        if generation < min_generation {
            return Err(RejectReason::StaleEvent);
        }
        let self_seq = self_parent_id
            .map(|id| self.self_seq[id.index()] + 1)
            .unwrap_or(1);

        let id = EventId(self.events.len() as u32);
        let creator = raw.creator;

        let mut ancestor_set = HashSet::new();
        ancestor_set.insert(id);
        if let Some(sp) = self_parent_id {
            ancestor_set.extend(self.ancestor_set(sp).iter().copied());
        }
        if let Some(op) = other_parent_id {
            ancestor_set.extend(self.ancestor_set(op).iter().copied());
        }

        let event = Event {
            raw,
            id,
            self_parent_id,
            other_parent_id,
            generation,
            round_created: 0,
            is_witness: false,
            fame: Fame::Undecided,
            is_judge: false,
            round_received: None,
            consensus_timestamp: None,
            consensus_order: None,
        };

        self.events.push(Some(event));
        self.children.push(Vec::new());
        self.self_children.push(Vec::new());
        self.self_seq.push(self_seq);
        self.ancestors.push(Some(ancestor_set));
        self.by_hash.insert(*self.events[id.index()].as_ref().unwrap().hash(), id);
        if (creator as usize) >= self.by_creator.len() {
            self.by_creator.resize(creator as usize + 1, Vec::new());
        }
        self.by_creator[creator as usize].push(id);
        if let Some(sp) = self_parent_id {
            self.children[sp.index()].push(id);
            self.self_children[sp.index()].push(id);
        }
        if let Some(op) = other_parent_id {
            self.children[op.index()].push(id);
        }

        Ok(id)
    }

    /// Validates that the address book carries a stake entry for every
    /// creator this graph will see, failing fast on a malformed book.
    pub fn validate_address_book(book: &AddressBook) -> Result<(), FatalError> {
        if book.size() == 0 {
            return Err(FatalError::InvalidAddressBook("empty address book"));
        }
        Ok(())
    }

    /// Iterates every event still live in the graph (not yet expired), in
    /// insertion order.
    pub fn all_live_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter_map(|e| e.as_ref())
    }

    /// Ids of all events by `creator`, in admission (causal) order.
    pub fn events_by_creator(&self, creator: NodeId) -> &[EventId] {
        self.by_creator
            .get(creator as usize)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Whether `a` is an ancestor of `d` (reflexive): `a` is reachable from
    /// `d` through zero or more parent edges.
    pub fn is_ancestor(&self, a: EventId, d: EventId) -> bool {
        self.ancestor_set(d).contains(&a)
    }

    /// Whether `a` is a self-ancestor of `d` (reflexive): `a` is reachable
    /// from `d` through self-parent edges only.
    pub fn is_self_ancestor(&self, a: EventId, d: EventId) -> bool {
        let mut cur = Some(d);
        while let Some(c) = cur {
            if c == a {
                return true;
            }
            cur = self.event(c).and_then(|e| e.self_parent_id());
        }
        false
    }

    /// Iterates the self-ancestor chain of `d`, from `d` back to its
    /// creator's first event.
    pub fn self_ancestors(&self, d: EventId) -> SelfAncestorIter<'_> {
        SelfAncestorIter {
            graph: self,
            current: Some(d),
        }
    }

    /// Whether `events` (assumed to share one creator) are free of a
    /// visible fork: every pair is self-ancestor related.
    fn is_fork_free(&self, events: &[EventId]) -> bool {
        for i in 0..events.len() {
            for j in (i + 1)..events.len() {
                let (a, b) = (events[i], events[j]);
                if !self.is_self_ancestor(a, b) && !self.is_self_ancestor(b, a) {
                    return false;
                }
            }
        }
        true
    }

    /// Event `x` sees `y`: `y` is an ancestor of `x`, and no fork by
    /// `y`'s creator visible among `x`'s ancestors hides `y`.
    pub fn sees(&self, x: EventId, y: EventId) -> bool {
        if !self.is_ancestor(y, x) {
            return false;
        }
        let creator = match self.event(y) {
            Some(e) => e.creator(),
            None => return false,
        };
        let ax = self.ancestor_set(x);
        let same_creator: Vec<EventId> = self
            .events_by_creator(creator)
            .iter()
            .copied()
            .filter(|e| ax.contains(e))
            .collect();
        self.is_fork_free(&same_creator)
    }

    /// Whether two events by the same creator fork each other (neither is
    /// a self-ancestor of the other).
    pub fn is_fork(&self, a: EventId, b: EventId) -> bool {
        !self.is_self_ancestor(a, b) && !self.is_self_ancestor(b, a)
    }

    fn descendants(&self, root: EventId) -> HashSet<EventId> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(e) = stack.pop() {
            if seen.insert(e) {
                if let Some(children) = self.children.get(e.index()) {
                    for &c in children {
                        stack.push(c);
                    }
                }
            }
        }
        seen
    }

    /// Event `x` strongly sees `y`: `x` can see events by a supermajority
    /// of creators, each of which in turn sees `y` (spec §4.4). A creator
    /// with a visible fork among `x`'s ancestors is excluded entirely, the
    /// same way a forked creator is excluded from `sees` — its stake never
    /// counts towards the supermajority. Computed by round-bounded... here
    /// graph-bounded, since the graph already expires old events... BFS, as
    /// the spec explicitly allows for correctness.
    pub fn strongly_sees(&self, x: EventId, y: EventId, book: &AddressBook) -> bool {
        let descendants_of_y = self.descendants(y);
        let ancestors_of_x = self.ancestor_set(x);
        let mut stake = 0u64;
        for creator in book.ids() {
            let seen_by_x: Vec<EventId> = self
                .events_by_creator(creator)
                .iter()
                .copied()
                .filter(|e| ancestors_of_x.contains(e))
                .collect();
            if !self.is_fork_free(&seen_by_x) {
                continue;
            }
            let min_seq_sees_y = self
                .events_by_creator(creator)
                .iter()
                .filter(|e| descendants_of_y.contains(e))
                .map(|e| self.self_seq[e.index()])
                .min();
            let max_seq_seen_by_x = seen_by_x.iter().map(|e| self.self_seq[e.index()]).max();
            if let (Some(min_y), Some(max_x)) = (min_seq_sees_y, max_seq_seen_by_x) {
                if max_x >= min_y {
                    stake += book.stake(creator);
                }
            }
        }
        book.is_supermajority(stake)
    }

    /// Frees an event's per-event caches and its hash/creator-index
    /// entries once it is no longer reachable by any future query (spec
    /// §4.7). The event's id stays reserved (never reused) so other
    /// events' ancestor sets, which may still mention it, stay valid.
    pub fn expire(&mut self, id: EventId) {
        if let Some(event) = self.events[id.index()].take() {
            self.by_hash.remove(event.hash());
            self.ancestors[id.index()] = None;
        }
    }
}

/// Iterator over an event's self-ancestor chain, newest first.
pub struct SelfAncestorIter<'a> {
    graph: &'a Graph,
    current: Option<EventId>,
}

impl<'a> Iterator for SelfAncestorIter<'a> {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        let id = self.current?;
        self.current = self.graph.event(id).and_then(|e| e.self_parent_id());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::Identity;
    use crate::event::UnsignedEvent;
    use std::time::SystemTime;

    fn raw(creator: NodeId, self_parent: Option<(Hash, i64)>, other_parent: Option<(Hash, i64)>, id: &Identity) -> RawEvent {
        UnsignedEvent::new(creator, self_parent, other_parent, SystemTime::now()).sign(id)
    }

    #[test]
    fn see_requires_ancestry() {
        let mut g = Graph::new(2);
        let id_a = Identity::generate();
        let id_b = Identity::generate();
        let e1 = raw(0, None, None, &id_a);
        let h1 = *e1.hash();
        let g1 = g.event_by_hash(&h1);
        assert!(g1.is_none());
        let id1 = g.insert(e1, 0).unwrap();
        let gen1 = g.event(id1).unwrap().generation();
        let e2 = raw(1, None, Some((h1, gen1)), &id_b);
        let id2 = g.insert(e2, 0).unwrap();
        assert!(!g.sees(id1, id2));
        assert!(g.sees(id2, id1));
    }

    #[test]
    fn strongly_sees_a_supermajority_chain() {
        let mut g = Graph::new(3);
        let a = Identity::generate();
        let b = Identity::generate();
        let c = Identity::generate();
        let book = AddressBook::new(vec![1, 1, 1]).unwrap();
        let a1 = g.insert(raw(0, None, None, &a), 0).unwrap();
        let ga1 = *g.event(a1).unwrap().hash();
        let gen_a1 = g.event(a1).unwrap().generation();
        let b1 = g.insert(raw(1, None, Some((ga1, gen_a1)), &b), 0).unwrap();
        let gb1 = *g.event(b1).unwrap().hash();
        let gen_b1 = g.event(b1).unwrap().generation();
        let c1 = g.insert(raw(2, None, Some((gb1, gen_b1)), &c), 0).unwrap();
        let gc1 = *g.event(c1).unwrap().hash();
        let gen_c1 = g.event(c1).unwrap().generation();
        let a2 = g
            .insert(raw(0, Some((ga1, gen_a1)), Some((gc1, gen_c1)), &a), 0)
            .unwrap();
        assert!(g.strongly_sees(a2, a1, &book));
    }

    #[test]
    fn duplicate_event_rejected() {
        let mut g = Graph::new(1);
        let a = Identity::generate();
        let e1 = raw(0, None, None, &a);
        let e1_again = e1.clone();
        g.insert(e1, 0).unwrap();
        assert_eq!(g.insert(e1_again, 0).unwrap_err(), RejectReason::DuplicateEvent);
    }

    #[test]
    fn unknown_parent_rejected() {
        let mut g = Graph::new(1);
        let a = Identity::generate();
        let e = raw(0, None, Some((Hash::random(), 1)), &a);
        assert_eq!(g.insert(e, 0).unwrap_err(), RejectReason::UnknownParent);
    }

    #[test]
    fn forked_creator_excluded_from_strongly_sees() {
        // Spec S3: a forked creator (two events by the same node where
        // neither is a self-ancestor of the other) must not contribute its
        // stake to a strongly-sees supermajority, even once some other
        // event has seen both forks.
        //
        // A(stake 2) forks into fork1/fork2; B(stake 2) first sees fork1
        // (via b1), then later directly references fork2 as well (via x).
        // C(stake 1) never appears in x's ancestry, so with fork1/fork2
        // excluded the only stake x can bring to bear on `strongly_sees(x,
        // fork1)` is B's 2, short of the supermajority threshold (>3 of a
        // total of 5). Before the fix, A's stake counted anyway (both
        // forks share the same self-seq, so the self-seq-range check
        // alone can't tell them apart), wrongly reaching 4 > 3.
        let book = AddressBook::new(vec![2, 2, 1]).unwrap();
        let mut g = Graph::new(3);
        let a = Identity::generate();
        let b = Identity::generate();

        let fork1 = raw(0, None, None, &a);
        let h_fork1 = *fork1.hash();
        let id_fork1 = g.insert(fork1, 0).unwrap();
        let gen_fork1 = g.event(id_fork1).unwrap().generation();

        // A distinct payload guarantees a distinct hash from `fork1` even if
        // both share the same wall-clock tick.
        let fork2 = UnsignedEvent::new(0, None, None, SystemTime::now())
            .with_transaction(vec![1u8].into_boxed_slice())
            .sign(&a);
        let h_fork2 = *fork2.hash();
        let id_fork2 = g.insert(fork2, 0).unwrap();
        let gen_fork2 = g.event(id_fork2).unwrap().generation();
        assert!(g.is_fork(id_fork1, id_fork2));

        let b1 = raw(1, None, Some((h_fork1, gen_fork1)), &b);
        let h_b1 = *b1.hash();
        let id_b1 = g.insert(b1, 0).unwrap();
        let gen_b1 = g.event(id_b1).unwrap().generation();

        let x = raw(1, Some((h_b1, gen_b1)), Some((h_fork2, gen_fork2)), &b);
        let id_x = g.insert(x, 0).unwrap();

        assert!(!g.sees(id_x, id_fork1));
        assert!(!g.strongly_sees(id_x, id_fork1, &book));
    }
}
