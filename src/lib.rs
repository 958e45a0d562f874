//! Hashgraph aBFT consensus core: virtual voting over a weighted event DAG.
//!
//! This crate computes a Byzantine fault tolerant total order and
//! consensus timestamp over events supplied by an external gossip layer.
//! It does not gossip, does not sign on a caller's behalf beyond the
//! [`author`] helper, and does not interpret transaction payloads; see each
//! module's docs for its exact boundary.
#![deny(missing_docs)]
#![deny(warnings)]

pub mod address_book;
pub mod author;
pub mod config;
pub mod consensus;
pub mod election;
pub mod error;
pub mod event;
pub mod graph;
pub mod hash;
pub mod round;
pub mod wire;

pub use address_book::{AddressBook, NodeId};
pub use author::{Author, Identity, Signature};
pub use config::Config;
pub use consensus::{
    AddEventOutcome, ConsensusRound, ConsensusState, Hashgraph, PersistedState, PersistedStateStore,
};
pub use error::{Error, FatalError, RejectReason};
pub use event::{Event, EventId, Fame, RawEvent, UnsignedEvent};
pub use hash::Hash;
