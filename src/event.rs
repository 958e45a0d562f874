//! C2: the immutable unit of the DAG, plus the derived fields the core
//! writes onto it as consensus progresses (spec §3).
use crate::address_book::NodeId;
use crate::author::{Author, Identity, Signature};
use crate::error::Error;
use crate::hash::Hash;
use crate::wire::{self, WireParent};
use std::time::SystemTime;

/// A compact, dense identifier for an event inside one graph index.
/// Cheap to copy and use as an array index (spec §9, "Cyclic & shared
/// references").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EventId(pub(crate) u32);

impl EventId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The tri-state fame of a witness (spec §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fame {
    /// No vote has decided this witness's fame yet.
    Undecided,
    /// The witness was decided famous.
    Yes,
    /// The witness was decided not famous.
    No,
}

impl Fame {
    /// Whether this witness's fame has been decided either way.
    pub fn is_decided(&self) -> bool {
        !matches!(self, Fame::Undecided)
    }

    /// Whether this witness was decided famous.
    pub fn is_yes(&self) -> bool {
        matches!(self, Fame::Yes)
    }
}

/// An event not yet admitted to the graph, under construction by its
/// creator.
#[derive(Clone, Debug)]
pub struct UnsignedEvent {
    creator: NodeId,
    self_parent: Option<Hash>,
    self_parent_generation: i64,
    other_parent: Option<Hash>,
    other_parent_generation: i64,
    creation_time: SystemTime,
    transactions: Vec<Box<[u8]>>,
}

impl UnsignedEvent {
    /// Starts a new event with no parents (the creator's first event).
    pub fn genesis(creator: NodeId, creation_time: SystemTime) -> Self {
        Self::new(creator, None, None, creation_time)
    }

    /// Starts a new event. `self_parent` is `None` only for a creator's
    /// first event; that first event may still carry an `other_parent` if
    /// the creator had already learned of another node's event before
    /// creating its own (spec §4.3 S1).
    pub fn new(
        creator: NodeId,
        self_parent: Option<(Hash, i64)>,
        other_parent: Option<(Hash, i64)>,
        creation_time: SystemTime,
    ) -> Self {
        let (self_parent, self_parent_generation) = match self_parent {
            Some((h, g)) => (Some(h), g),
            None => (None, -1),
        };
        let (other_parent, other_parent_generation) = match other_parent {
            Some((h, g)) => (Some(h), g),
            None => (None, -1),
        };
        Self {
            creator,
            self_parent,
            self_parent_generation,
            other_parent,
            other_parent_generation,
            creation_time,
            transactions: Vec::new(),
        }
    }

    /// Attaches a transaction payload; consensus orders these, never
    /// interprets them.
    pub fn with_transaction(mut self, payload: Box<[u8]>) -> Self {
        self.transactions.push(payload);
        self
    }

    fn wire_self_parent(&self) -> WireParent {
        match self.self_parent {
            Some(h) => WireParent::some(h, self.self_parent_generation),
            None => WireParent::none(),
        }
    }

    fn wire_other_parent(&self) -> WireParent {
        match self.other_parent {
            Some(h) => WireParent::some(h, self.other_parent_generation),
            None => WireParent::none(),
        }
    }

    /// The base hash this event will carry once signed (spec §6).
    pub fn hash(&self) -> Hash {
        wire::base_hash(
            self.creator,
            self.wire_self_parent(),
            self.wire_other_parent(),
            self.creation_time,
            &self.transactions,
        )
    }

    /// Signs this event, producing the admissible [`RawEvent`].
    pub fn sign(self, identity: &Identity) -> RawEvent {
        let hash = self.hash();
        let signature = identity.sign(hash.as_bytes());
        RawEvent {
            creator: self.creator,
            self_parent: self.self_parent,
            other_parent: self.other_parent,
            creation_time: self.creation_time,
            transactions: self.transactions,
            hash,
            signature,
        }
    }
}

/// A signed event as received from the gossip layer, not yet admitted to
/// the graph. Signature verification is a collaborator's responsibility
/// (spec §5); this type only carries the signature for wire fidelity.
#[derive(Clone, Debug)]
pub struct RawEvent {
    pub(crate) creator: NodeId,
    pub(crate) self_parent: Option<Hash>,
    pub(crate) other_parent: Option<Hash>,
    pub(crate) creation_time: SystemTime,
    pub(crate) transactions: Vec<Box<[u8]>>,
    pub(crate) hash: Hash,
    pub(crate) signature: Signature,
}

impl RawEvent {
    /// The creator's id.
    pub fn creator(&self) -> NodeId {
        self.creator
    }

    /// Hash of the self-parent, if any.
    pub fn self_parent(&self) -> Option<&Hash> {
        self.self_parent.as_ref()
    }

    /// Hash of the other-parent, if any.
    pub fn other_parent(&self) -> Option<&Hash> {
        self.other_parent.as_ref()
    }

    /// This event's base hash.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// This event's signature over its base hash.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Verifies this event's signature against its claimed author. The
    /// consensus core never calls this itself (spec §5); it is provided for
    /// collaborators that validate events before `add_event`.
    pub fn verify_signature(&self, author: &Author) -> Result<(), Error> {
        author.verify(self.hash.as_bytes(), &self.signature)
    }
}

/// An event admitted to the graph index, with the derived fields the core
/// writes as consensus progresses. Once `consensus_order` is set, none of
/// the finalised fields (`round_received`, `consensus_timestamp`,
/// `consensus_order`) are ever written again (spec §3 invariant 6).
#[derive(Clone, Debug)]
pub struct Event {
    pub(crate) raw: RawEvent,
    pub(crate) id: EventId,
    pub(crate) self_parent_id: Option<EventId>,
    pub(crate) other_parent_id: Option<EventId>,
    pub(crate) generation: i64,
    pub(crate) round_created: i64,
    pub(crate) is_witness: bool,
    pub(crate) fame: Fame,
    pub(crate) is_judge: bool,
    pub(crate) round_received: Option<i64>,
    pub(crate) consensus_timestamp: Option<SystemTime>,
    pub(crate) consensus_order: Option<u64>,
}

impl Event {
    /// This event's compact id within its graph index.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The creator's id.
    pub fn creator(&self) -> NodeId {
        self.raw.creator
    }

    /// Hash of the self-parent, if any.
    pub fn self_parent_hash(&self) -> Option<&Hash> {
        self.raw.self_parent.as_ref()
    }

    /// Compact id of the self-parent, if any.
    pub fn self_parent_id(&self) -> Option<EventId> {
        self.self_parent_id
    }

    /// Compact id of the other-parent, if any.
    pub fn other_parent_id(&self) -> Option<EventId> {
        self.other_parent_id
    }

    /// Author's claimed creation time.
    pub fn creation_time(&self) -> SystemTime {
        self.raw.creation_time
    }

    /// The event's base hash.
    pub fn hash(&self) -> &Hash {
        &self.raw.hash
    }

    /// Transaction payloads carried by this event.
    pub fn transactions(&self) -> &[Box<[u8]>] {
        &self.raw.transactions
    }

    /// Derived generation: `1 + max(parent generations)`, or `1` with no
    /// parents.
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// The round this event was created in.
    pub fn round_created(&self) -> i64 {
        self.round_created
    }

    /// Whether this event is a witness (first event of its creator in its
    /// round).
    pub fn is_witness(&self) -> bool {
        self.is_witness
    }

    /// Current fame decision, meaningful only for witnesses.
    pub fn fame(&self) -> Fame {
        self.fame
    }

    /// Whether this witness is the judge of its (round, creator).
    pub fn is_judge(&self) -> bool {
        self.is_judge
    }

    /// The round in which this event was finalised, if any.
    pub fn round_received(&self) -> Option<i64> {
        self.round_received
    }

    /// The consensus timestamp assigned at finalisation, if any.
    pub fn consensus_timestamp(&self) -> Option<SystemTime> {
        self.consensus_timestamp
    }

    /// The dense global consensus order assigned at finalisation, if any.
    pub fn consensus_order(&self) -> Option<u64> {
        self.consensus_order
    }

    /// Whether this event has already reached consensus.
    pub fn is_finalised(&self) -> bool {
        self.consensus_order.is_some()
    }
}
