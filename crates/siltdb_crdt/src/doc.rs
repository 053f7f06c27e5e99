//! Document: named sequences behind one transaction boundary.

use crate::clock::LamportClock;
use crate::error::CrdtResult;
use crate::id::{ItemId, ReplicaId};
use crate::seq::Sequence;
use crate::update::{self, DocUpdate};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Where a committed transaction originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOrigin {
    /// A local `transact` call.
    Local,
    /// A merged remote update.
    Remote,
}

/// Metadata handed to document observers after a commit.
#[derive(Debug, Clone)]
pub struct TxnSummary {
    /// Origin of the transaction.
    pub origin: TxnOrigin,
    /// Names of sequences the transaction changed.
    pub sequences: Vec<String>,
}

type ObserverFn = Arc<dyn Fn(&TxnSummary) + Send + Sync>;

#[derive(Default)]
struct ObserverSet {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, ObserverFn)>>,
}

impl ObserverSet {
    fn subscribe(&self, cb: ObserverFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().push((id, cb));
        id
    }

    fn unsubscribe(&self, id: u64) {
        self.entries.lock().retain(|(sub_id, _)| *sub_id != id);
    }

    fn notify(&self, summary: &TxnSummary) {
        // Snapshot the callbacks so observers may subscribe or cancel
        // from inside their own callback without deadlocking.
        let callbacks: Vec<ObserverFn> =
            self.entries.lock().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for cb in callbacks {
            cb(summary);
        }
    }
}

/// Token for a registered document observer.
///
/// Cancelling is deterministic: after `cancel` returns, the callback
/// will not fire again.
pub struct DocSubscription {
    id: u64,
    set: Weak<ObserverSet>,
}

impl DocSubscription {
    /// Removes the observer this token stands for.
    pub fn cancel(self) {
        if let Some(set) = self.set.upgrade() {
            set.unsubscribe(self.id);
        }
    }
}

struct DocState {
    clock: LamportClock,
    sequences: BTreeMap<String, Sequence>,
}

/// A replicated document holding named sequences.
///
/// All mutations run inside [`Doc::transact`]; observers fire exactly
/// once per committed transaction, synchronously, after the state lock
/// is released. Remote updates applied through [`Doc::apply_update`] go
/// through the same notification path with [`TxnOrigin::Remote`].
///
/// One `Doc` is one replica: it has a single writer at a time (the
/// interior lock enforces this) and a single Lamport clock shared by all
/// of its sequences.
pub struct Doc {
    replica: ReplicaId,
    state: RwLock<DocState>,
    observers: Arc<ObserverSet>,
}

impl Doc {
    /// Creates a document with a fresh random replica ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_replica(ReplicaId::random())
    }

    /// Creates a document with a caller-chosen replica ID.
    #[must_use]
    pub fn with_replica(replica: ReplicaId) -> Self {
        Self {
            replica,
            state: RwLock::new(DocState {
                clock: LamportClock::new(),
                sequences: BTreeMap::new(),
            }),
            observers: Arc::new(ObserverSet::default()),
        }
    }

    /// Returns this document's replica ID.
    #[must_use]
    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Runs `f` inside a transaction.
    ///
    /// Observers are notified once after the closure returns, and only
    /// if the transaction changed at least one sequence. Reads performed
    /// through the [`TxnRef`] see the transaction's own writes.
    ///
    /// Transactions must not nest: calling `transact` or `apply_update`
    /// from inside `f` or from an observer callback that this commit
    /// triggered synchronously on the same `Doc` is allowed only after
    /// the inner state lock is released, which is the case for observer
    /// callbacks but not for `f` itself.
    pub fn transact<T>(&self, f: impl FnOnce(&mut TxnRef<'_>) -> T) -> T {
        let (result, touched) = {
            let mut state = self.state.write();
            let mut txn = TxnRef {
                state: &mut state,
                replica: self.replica,
                touched: BTreeSet::new(),
            };
            let result = f(&mut txn);
            (result, txn.touched)
        };

        if !touched.is_empty() {
            self.observers.notify(&TxnSummary {
                origin: TxnOrigin::Local,
                sequences: touched.into_iter().collect(),
            });
        }
        result
    }

    /// Reads a named sequence.
    ///
    /// The closure receives `None` if the sequence has never been
    /// written.
    pub fn with_sequence<T>(&self, name: &str, f: impl FnOnce(Option<&Sequence>) -> T) -> T {
        let state = self.state.read();
        f(state.sequences.get(name))
    }

    /// Registers an observer for committed transactions.
    pub fn observe(
        &self,
        cb: impl Fn(&TxnSummary) + Send + Sync + 'static,
    ) -> DocSubscription {
        let id = self.observers.subscribe(Arc::new(cb));
        DocSubscription {
            id,
            set: Arc::downgrade(&self.observers),
        }
    }

    /// Encodes this document's full state for another replica.
    pub fn encode_update(&self) -> CrdtResult<Vec<u8>> {
        let state = self.state.read();
        let update = DocUpdate {
            sequences: state
                .sequences
                .iter()
                .map(|(name, seq)| (name.clone(), seq.export()))
                .collect(),
        };
        update::encode(&update)
    }

    /// Merges an update produced by another replica's `encode_update`.
    ///
    /// Applies inside its own transaction boundary; observers see one
    /// commit with [`TxnOrigin::Remote`] listing the sequences that
    /// actually changed. Applying the same update again is a no-op and
    /// does not notify.
    pub fn apply_update(&self, bytes: &[u8]) -> CrdtResult<()> {
        let update = update::decode(bytes)?;

        let changed = {
            let mut state = self.state.write();
            let mut changed = Vec::new();
            for (name, items) in update.sequences {
                let max_stamp = items.iter().map(|i| i.id.stamp).max().unwrap_or(0);
                state.clock.observe(max_stamp);

                let seq = state.sequences.entry(name.clone()).or_default();
                if seq.merge(items) {
                    changed.push(name);
                }
            }
            changed
        };

        if !changed.is_empty() {
            debug!(sequences = ?changed, "merged remote update");
            self.observers.notify(&TxnSummary {
                origin: TxnOrigin::Remote,
                sequences: changed,
            });
        }
        Ok(())
    }
}

impl Default for Doc {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Doc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc")
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}

/// Mutable view of the document inside a transaction.
pub struct TxnRef<'a> {
    state: &'a mut DocState,
    replica: ReplicaId,
    touched: BTreeSet<String>,
}

impl TxnRef<'_> {
    /// Appends a payload to a named sequence and returns its identity.
    pub fn append(&mut self, seq: &str, payload: Vec<u8>) -> ItemId {
        let stamp = self.state.clock.tick();
        let id = ItemId::new(stamp, self.replica);
        self.state
            .sequences
            .entry(seq.to_string())
            .or_default()
            .insert(id, payload);
        self.touched.insert(seq.to_string());
        id
    }

    /// Tombstones an item in a named sequence.
    ///
    /// Returns whether a live item was reclaimed.
    pub fn delete(&mut self, seq: &str, id: ItemId) -> bool {
        let reclaimed = self
            .state
            .sequences
            .entry(seq.to_string())
            .or_default()
            .delete(id);
        if reclaimed {
            self.touched.insert(seq.to_string());
        }
        reclaimed
    }

    /// Reads a named sequence, seeing this transaction's own writes.
    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.state.sequences.get(name)
    }
}
