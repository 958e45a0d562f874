//! Node identity: the signing keys events are created and verified with.
//!
//! The consensus core itself never verifies signatures (spec §5: "the core
//! does not verify signatures") — that is a collaborator's job, done before
//! `add_event` is called. These types exist for the boundary: constructing
//! and signing events, and for tests that want realistic signed fixtures.
use crate::error::Error;
use async_std::fs::{File, Permissions};
use async_std::path::Path;
use async_std::{fs, prelude::*};
use core::cmp::Ordering;
use core::fmt::{Debug, Formatter, Result as FmtResult};
use core::hash::{Hash as StdHash, Hasher as StdHasher};
use core::ops::Deref;
use data_encoding::BASE32;
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature as RawSignature};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// An author's public key.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Author(PublicKey);

impl Debug for Author {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", BASE32.encode(self.0.as_bytes()))
    }
}

impl Serialize for Author {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0.as_bytes())
    }
}

impl<'de> Deserialize<'de> for Author {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(deserializer)?;
        Self::from_bytes(bytes).map_err(SerdeError::custom)
    }
}

impl Deref for Author {
    type Target = PublicKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialOrd for Author {
    fn partial_cmp(&self, other: &Author) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Author {
    fn cmp(&self, other: &Author) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl StdHash for Author {
    fn hash<H: StdHasher>(&self, h: &mut H) {
        self.0.as_bytes().hash(h);
    }
}

impl Author {
    /// Parses an author's public key from its wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(PublicKey::from_bytes(bytes)?))
    }

    /// Verifies a signature made over `msg` by this author.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), Error> {
        self.0.verify(msg, &sig.0).map_err(Error::from)
    }
}

/// An ed25519 signature over an event's base hash.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Signature(RawSignature);

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", BASE32.encode(&self.0.to_bytes()))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(deserializer)?;
        Self::from_bytes(bytes).map_err(SerdeError::custom)
    }
}

impl Signature {
    /// Parses a signature from its wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(RawSignature::from_bytes(bytes)?))
    }

    /// The raw signature bytes, as carried on the wire (spec §6 item 6).
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

/// A node's signing identity.
#[derive(Debug)]
pub struct Identity(Keypair);

impl Identity {
    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(Keypair::generate(&mut OsRng))
    }

    /// Signs `msg` (typically an event's base hash) with this identity.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg))
    }

    /// This identity's public author id.
    pub fn author(&self) -> Author {
        Author(self.0.public)
    }

    /// Loads an identity from `path`, generating and persisting one if it
    /// does not exist yet.
    pub async fn load_from(path: &Path) -> Result<Self, Error> {
        if !path.exists().await {
            let key = Self::generate();
            let bytes = key.0.to_bytes();
            let mut file = File::create(path).await?;
            #[cfg(unix)]
            file.set_permissions(Permissions::from_mode(0o600)).await?;
            file.write_all(&bytes[..]).await?;
        }
        let bytes = fs::read(path).await?;
        let secret = SecretKey::from_bytes(&bytes[..32])?;
        let public = PublicKey::from(&secret);
        let keypair = Keypair { secret, public };
        Ok(Self(keypair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[async_std::test]
    async fn load_from() {
        let tmp = TempDir::new("load_from").unwrap();
        let path = tmp.path().join("identity");
        let path: &Path = path.as_path().into();
        let key1 = Identity::load_from(path).await.unwrap();
        let key2 = Identity::load_from(path).await.unwrap();
        assert_eq!(key1.author(), key2.author());
    }

    #[test]
    fn sign_and_verify() {
        let id = Identity::generate();
        let msg = b"hello hashgraph";
        let sig = id.sign(msg);
        assert!(id.author().verify(msg, &sig).is_ok());
        let other = Identity::generate();
        assert!(other.author().verify(msg, &sig).is_err());
    }
}
