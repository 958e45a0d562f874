//! Bit-exact on-wire event encoding (spec §6), used to compute an event's
//! base hash identically on every node.
use crate::address_book::NodeId;
use crate::hash::{Hash, Hasher, ZERO_HASH};
use std::time::SystemTime;

/// A parent reference as it appears on the wire: its hash (or the zero
/// hash, if absent) and its generation (or -1, if absent).
#[derive(Clone, Copy, Debug)]
pub struct WireParent {
    pub hash: Hash,
    pub generation: i64,
}

impl WireParent {
    /// The wire encoding of a present parent.
    pub fn some(hash: Hash, generation: i64) -> Self {
        Self { hash, generation }
    }

    /// The wire encoding of an absent parent.
    pub fn none() -> Self {
        Self {
            hash: ZERO_HASH,
            generation: -1,
        }
    }

    fn write(&self, hasher: &mut Hasher) {
        hasher.write(self.hash.as_bytes());
        hasher.write(&self.generation.to_be_bytes());
    }
}

/// Splits a `SystemTime` into the signed (seconds, nanos) pair the wire
/// format uses (spec §6 item 4).
pub fn split_time(time: SystemTime) -> (i64, i32) {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i32),
        Err(e) => {
            let d = e.duration();
            let secs = d.as_secs() as i64;
            let nanos = d.subsec_nanos() as i32;
            if nanos == 0 {
                (-secs, 0)
            } else {
                (-secs - 1, 1_000_000_000 - nanos)
            }
        }
    }
}

/// Reassembles a `SystemTime` from the wire's (seconds, nanos) pair.
pub fn join_time(secs: i64, nanos: i32) -> SystemTime {
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + std::time::Duration::new(secs as u64, nanos as u32)
    } else {
        SystemTime::UNIX_EPOCH - std::time::Duration::new((-secs) as u64, nanos as u32)
    }
}

/// Computes the base hash of an event: `SHA-384` over the concatenation of
/// creator id, parent refs, creation time, and transactions, in the order
/// fixed by spec §6 items 1-5.
#[allow(clippy::too_many_arguments)]
pub fn base_hash(
    creator_id: NodeId,
    self_parent: WireParent,
    other_parent: WireParent,
    creation_time: SystemTime,
    transactions: &[Box<[u8]>],
) -> Hash {
    let mut hasher = Hasher::new();
    hasher.write(&(creator_id as i64).to_be_bytes());
    self_parent.write(&mut hasher);
    other_parent.write(&mut hasher);
    let (secs, nanos) = split_time(creation_time);
    hasher.write(&secs.to_be_bytes());
    hasher.write(&nanos.to_be_bytes());
    hasher.write(&(transactions.len() as i32).to_be_bytes());
    for tx in transactions {
        hasher.write(&(tx.len() as i32).to_be_bytes());
        hasher.write(tx);
    }
    hasher.sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_roundtrips() {
        for secs in [-100_i64, -1, 0, 1, 12345] {
            for nanos in [0_i32, 1, 999_999_999] {
                let t = join_time(secs, nanos);
                let (s2, n2) = split_time(t);
                assert_eq!((secs, nanos), (s2, n2));
            }
        }
    }

    #[test]
    fn base_hash_is_deterministic_and_sensitive() {
        let t = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(10);
        let h1 = base_hash(0, WireParent::none(), WireParent::none(), t, &[]);
        let h2 = base_hash(0, WireParent::none(), WireParent::none(), t, &[]);
        assert_eq!(h1, h2);
        let h3 = base_hash(1, WireParent::none(), WireParent::none(), t, &[]);
        assert_ne!(h1, h3);
    }
}
