//! Deterministic winner selection for concurrent writes.
//!
//! When partitioned replicas each write the same key and later merge,
//! every surviving entry for that key is a candidate and exactly one
//! must win — identically on every replica, or the replicas diverge.
//! Both policies below are total orders over candidates, so folding
//! them over the candidates in any order picks the same winner
//! everywhere. Neither is guaranteed to correlate with real-world write
//! time under clock skew; `LastWriteWins` only approximates it via
//! Lamport stamps.

use sha2::{Digest, Sha256};
use siltdb_crdt::ItemId;

/// Policy for resolving concurrent writes to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPolicy {
    /// The entry later in the engine's structural order wins.
    ///
    /// Cheapest: no extra bytes per entry, no hashing. The structural
    /// order (stamp, then replica) is stable and convergent but
    /// arbitrary with respect to wall-clock time for concurrent writes.
    #[default]
    Positional,

    /// The entry with the higher Lamport stamp wins; ties break on a
    /// hash of the stored bytes, then on replica ID.
    ///
    /// Closer to "last real-world edit wins" when replicas sync often.
    /// Equal hashes mean byte-identical entries, so the final replica
    /// tie-break only makes the order total; it never picks between
    /// different values.
    LastWriteWins,
}

/// One surviving entry competing for a key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate<'a> {
    /// Position identity; its stamp doubles as the logical timestamp.
    pub id: ItemId,
    /// The entry's raw stored bytes.
    pub bytes: &'a [u8],
}

impl ResolutionPolicy {
    /// Returns true if `challenger` beats `incumbent`.
    pub(crate) fn wins(self, challenger: &Candidate<'_>, incumbent: &Candidate<'_>) -> bool {
        match self {
            ResolutionPolicy::Positional => challenger.id > incumbent.id,
            ResolutionPolicy::LastWriteWins => {
                let by_stamp = challenger.id.stamp.cmp(&incumbent.id.stamp);
                let by_hash =
                    by_stamp.then_with(|| digest(challenger.bytes).cmp(&digest(incumbent.bytes)));
                by_hash
                    .then_with(|| challenger.id.replica.cmp(&incumbent.id.replica))
                    .is_gt()
            }
        }
    }
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}
