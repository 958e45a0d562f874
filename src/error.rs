//! Error taxonomy (spec §7).
use thiserror::Error;

/// Ambient I/O-and-below errors: identity loading, signature parsing,
/// persistence. These never occur while the consensus thread itself is
/// running `add_event` — they are surfaced by the collaborators at the
/// boundary (loading an identity, opening a persisted-state store).
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse a public key.
    #[error("invalid public key: {0}")]
    Sig(#[from] ed25519_dalek::SignatureError),
    /// An on-disk or network I/O failure.
    #[error("{0}")]
    Io(#[from] async_std::io::Error),
    /// The system clock is behind the UNIX epoch.
    #[error("{0}")]
    Time(#[from] std::time::SystemTimeError),
    /// A `bincode` (de)serialization failure in the persisted-state layer.
    #[error("{0}")]
    Serde(#[from] bincode::Error),
    /// A `sled` storage failure in the persisted-state layer.
    #[error("{0}")]
    Sled(#[from] sled::Error),
}

/// Rejections `add_event` returns synchronously; the caller is responsible
/// for any follow-up (buffering, re-sending, ignoring).
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum RejectReason {
    /// `add_event` referenced a parent hash not present in the graph. The
    /// caller must buffer the event until the parent is admitted.
    #[error("unknown parent")]
    UnknownParent,
    /// The event's generation is below the current expiry frontier.
    #[error("stale event")]
    StaleEvent,
    /// An event with the same base hash was already admitted; this is a
    /// success-with-no-op, not a real error, but is reported distinctly so
    /// callers can tell gossip duplicates from genuinely new events.
    #[error("duplicate event")]
    DuplicateEvent,
}

/// Fatal errors: the core must halt and refuse further mutating calls.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum FatalError {
    /// The address book supplied at `initialise` is malformed.
    #[error("invalid address book: {0}")]
    InvalidAddressBook(&'static str),
    /// A computed round/witness relation contradicted one computed earlier
    /// for the same event. Two honest nodes with the same inputs can never
    /// observe this; it indicates a bug in this implementation.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
    /// An inconsistency was detected while progressing an election.
    #[error("election progress error: {0}")]
    ElectionProgressError(&'static str),
}
