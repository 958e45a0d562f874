//! The SHA-384 digest type used for event hashes and the running hash of
//! the consensus stream (spec §6).
use data_encoding::BASE32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha384};

/// Length in bytes of a [`Hash`].
pub const HASH_LENGTH: usize = 48;

/// The all-zero hash, used as the genesis predecessor of the running hash
/// chain and as the wire placeholder for a null parent.
pub const ZERO_HASH: Hash = Hash([0u8; HASH_LENGTH]);

/// A SHA-384 digest.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// Builds a hash from a byte slice. Panics if `bytes` is not
    /// [`HASH_LENGTH`] long; callers parsing untrusted wire data must check
    /// the length first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hash = [0u8; HASH_LENGTH];
        hash.copy_from_slice(bytes);
        Self(hash)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// XORs this hash with `whitening`, used by the consensus order
    /// tie-break (spec §4.6 step 4).
    pub fn xor(&self, whitening: &Hash) -> Self {
        let mut out = [0u8; HASH_LENGTH];
        for i in 0..HASH_LENGTH {
            out[i] = self.0[i] ^ whitening.0[i];
        }
        Self(out)
    }

    /// A pseudo-random bit derived from a fixed byte of the digest, used by
    /// coin-round voting (spec §4.5).
    pub fn coin_bit(&self) -> bool {
        self.0[HASH_LENGTH - 1] & 1 == 1
    }

    #[cfg(test)]
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; HASH_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl core::fmt::Debug for Hash {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", BASE32.encode(&self.0))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(deserializer)?;
        if bytes.len() != HASH_LENGTH {
            return Err(serde::de::Error::invalid_length(bytes.len(), &"48"));
        }
        Ok(Self::from_bytes(bytes))
    }
}

/// Incremental SHA-384 hasher, mirroring the teacher's `Hasher` wrapper
/// around its own digest primitive.
pub struct Hasher(Sha384);

impl Hasher {
    /// Starts a new hash computation.
    pub fn new() -> Self {
        Self(Sha384::new())
    }

    /// Feeds more bytes into the digest.
    pub fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Finalises the digest.
    pub fn sum(self) -> Hash {
        Hash::from_bytes(self.0.finalize().as_slice())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// The running hash of the emitted consensus stream (spec §6):
/// `H_0 = 0`, `H_n = SHA384(H_{n-1} || eventHash_n || order || ts_secs || ts_nanos)`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct RunningHash(Hash);

impl RunningHash {
    /// The genesis running hash, `H_0`.
    pub fn genesis() -> Self {
        Self(ZERO_HASH)
    }

    /// Restores a running hash from a previously published value, e.g. when
    /// resuming from persisted state.
    pub fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    /// The current accumulated value.
    pub fn value(&self) -> Hash {
        self.0
    }

    /// Folds one more consensus event into the chain.
    pub fn extend(&mut self, event_hash: &Hash, consensus_order: u64, secs: i64, nanos: i32) {
        let mut hasher = Hasher::new();
        hasher.write(self.0.as_bytes());
        hasher.write(event_hash.as_bytes());
        hasher.write(&consensus_order.to_be_bytes());
        hasher.write(&secs.to_be_bytes());
        hasher.write(&nanos.to_be_bytes());
        self.0 = hasher.sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_zero() {
        assert_eq!(RunningHash::genesis().value(), ZERO_HASH);
    }

    #[test]
    fn extend_is_deterministic() {
        let h1 = Hash::random();
        let mut a = RunningHash::genesis();
        let mut b = RunningHash::genesis();
        a.extend(&h1, 0, 100, 5);
        b.extend(&h1, 0, 100, 5);
        assert_eq!(a.value(), b.value());
        a.extend(&h1, 1, 101, 0);
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn xor_is_involutive() {
        let a = Hash::random();
        let b = Hash::random();
        assert_eq!(a.xor(&b).xor(&b), a);
    }
}
