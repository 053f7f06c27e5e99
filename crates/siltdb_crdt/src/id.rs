//! Replica and item identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a replica.
///
/// Each `Doc` instance gets its own replica ID. The ID participates in
/// the total order of [`ItemId`]s, so it must be unique across replicas
/// that ever exchange updates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Creates a fresh random replica ID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a replica ID from raw bytes.
    ///
    /// Useful for tests that need deterministic replicas.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica:{}", self.0)
    }
}

/// Identity of one appended item.
///
/// The pair (stamp, replica) is unique across all replicas: the stamp
/// comes from the appending replica's Lamport clock and the replica ID
/// disambiguates concurrent appends. The derived `Ord` (stamp first,
/// replica second) is the engine's structural order: every replica sorts
/// the same set of items identically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemId {
    /// Lamport stamp assigned at append time.
    pub stamp: u64,
    /// The replica that performed the append.
    pub replica: ReplicaId,
}

impl ItemId {
    /// Creates an item ID.
    #[must_use]
    pub const fn new(stamp: u64, replica: ReplicaId) -> Self {
        Self { stamp, replica }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item:{}@{}", self.stamp, self.replica.as_uuid())
    }
}
