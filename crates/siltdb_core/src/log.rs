//! Compact key-value log.
//!
//! Keyed state is modeled as an append-only sequence, not a native map:
//! a write appends a fresh entry and reclaims the previous entry for
//! the same key in the same transaction. Reclaimed entries are
//! positional tombstones — they say "something existed at this
//! position" without retaining the key or per-key conflict metadata —
//! so storage stays proportional to current data rather than operation
//! history.
//!
//! The log sequence is authoritative for merge correctness. The live
//! index is a derived cache: rebuilt by a full scan on open and after
//! every remote merge, incrementally updated on local writes.

use crate::codec::{decode_entry, encode_entry, LogEntry};
use crate::conflict::{Candidate, ResolutionPolicy};
use crate::error::StoreResult;
use crate::value::Value;
use parking_lot::RwLock;
use siltdb_crdt::{Doc, ItemId};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// One mutation of the live projection.
#[derive(Debug, Clone)]
pub(crate) enum LogOp {
    /// Replace the live value for a key.
    Put {
        /// The key being written.
        key: String,
        /// The full replacement value.
        value: Value,
    },
    /// Reclaim the live entry for a key.
    Delete {
        /// The key being deleted.
        key: String,
    },
}

/// Storage accounting for one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    /// Live entries (one per key).
    pub live: usize,
    /// Tombstone shells awaiting reclamation by the host engine.
    pub reclaimed: usize,
    /// Entries appended by this instance since open.
    pub appended: u64,
}

/// Append-and-reclaim storage backing one store's map interface.
///
/// Exclusively owned by one table or KV store; never shared. All
/// mutations run through the document's transaction boundary so every
/// replace is one observable change, not a delete followed by an
/// insert.
pub struct CompactLog {
    doc: Arc<Doc>,
    name: String,
    policy: ResolutionPolicy,
    index: RwLock<HashMap<String, ItemId>>,
    appended: AtomicU64,
}

impl CompactLog {
    /// Opens the log over a named sequence, building the live index
    /// with a full scan.
    pub(crate) fn open(
        doc: Arc<Doc>,
        name: impl Into<String>,
        policy: ResolutionPolicy,
    ) -> StoreResult<Self> {
        let log = Self {
            doc,
            name: name.into(),
            policy,
            index: RwLock::new(HashMap::new()),
            appended: AtomicU64::new(0),
        };
        log.refresh()?;
        Ok(log)
    }

    /// The document this log lives in.
    pub(crate) fn doc(&self) -> &Arc<Doc> {
        &self.doc
    }

    /// The underlying sequence name.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Number of live keys.
    pub(crate) fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Returns true if a live entry exists for `key`.
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.index.read().contains_key(key)
    }

    /// All live keys, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Reads the live value for `key`.
    pub(crate) fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let id = match self.index.read().get(key) {
            Some(id) => *id,
            None => return Ok(None),
        };

        let bytes = self
            .doc
            .with_sequence(&self.name, |seq| {
                seq.and_then(|s| s.get(id).map(<[u8]>::to_vec))
            });

        match bytes {
            Some(bytes) => Ok(Some(decode_entry(&bytes)?.value)),
            None => Ok(None),
        }
    }

    /// Snapshot of the live projection, sorted by key.
    ///
    /// Re-evaluated on each call; the returned iterator is finite and
    /// restartable by calling again.
    pub(crate) fn entries(&self) -> StoreResult<impl Iterator<Item = (String, Value)>> {
        let mut snapshot: Vec<(String, ItemId)> = self
            .index
            .read()
            .iter()
            .map(|(k, id)| (k.clone(), *id))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));

        let entries = self.doc.with_sequence(&self.name, |seq| -> StoreResult<Vec<(String, Value)>> {
            let mut out = Vec::with_capacity(snapshot.len());
            let Some(seq) = seq else {
                return Ok(out);
            };
            for (key, id) in snapshot {
                if let Some(bytes) = seq.get(id) {
                    out.push((key, decode_entry(bytes)?.value));
                }
            }
            Ok(out)
        })?;

        Ok(entries.into_iter())
    }

    /// Applies a group of operations inside one transaction.
    ///
    /// Each put reclaims the key's previous entry and appends the new
    /// one as a single atomic step. Returns the keys whose live value
    /// changed, in operation order.
    pub(crate) fn apply(&self, ops: Vec<LogOp>) -> StoreResult<Vec<String>> {
        // Encode up front so codec failures surface before any mutation.
        enum Prepared {
            Put { key: String, bytes: Vec<u8> },
            Delete { key: String },
        }
        let mut prepared = Vec::with_capacity(ops.len());
        for op in ops {
            prepared.push(match op {
                LogOp::Put { key, value } => Prepared::Put {
                    bytes: encode_entry(&LogEntry {
                        key: key.clone(),
                        value,
                    })?,
                    key,
                },
                LogOp::Delete { key } => Prepared::Delete { key },
            });
        }

        let mut index = self.index.write();
        let mut changed = Vec::new();
        let mut seen = HashSet::new();
        let mut puts = 0u64;

        self.doc.transact(|txn| {
            for op in prepared {
                match op {
                    Prepared::Put { key, bytes } => {
                        if let Some(old) = index.get(&key) {
                            txn.delete(&self.name, *old);
                        }
                        let id = txn.append(&self.name, bytes);
                        trace!(key = %key, %id, "appended entry");
                        index.insert(key.clone(), id);
                        puts += 1;
                        if seen.insert(key.clone()) {
                            changed.push(key);
                        }
                    }
                    Prepared::Delete { key } => {
                        if let Some(old) = index.remove(&key) {
                            txn.delete(&self.name, old);
                            if seen.insert(key.clone()) {
                                changed.push(key);
                            }
                        }
                    }
                }
            }
        });

        self.appended.fetch_add(puts, Ordering::Relaxed);
        Ok(changed)
    }

    /// Rebuilds the live index from a full scan.
    ///
    /// Where several live entries share a key — the signature of a
    /// merge of concurrent writes — the resolution policy picks one
    /// winner and the losers are reclaimed. The policy is a total
    /// order, so every replica that has the same entries reclaims the
    /// same losers and converges to the same live projection.
    ///
    /// Returns the keys whose live mapping changed, sorted.
    pub(crate) fn refresh(&self) -> StoreResult<Vec<String>> {
        let scan: Vec<(ItemId, Vec<u8>)> = self.doc.with_sequence(&self.name, |seq| {
            seq.map(|s| s.iter_live().map(|(id, b)| (id, b.to_vec())).collect())
                .unwrap_or_default()
        });

        let mut winners: HashMap<String, (ItemId, Vec<u8>)> = HashMap::new();
        let mut losers: Vec<ItemId> = Vec::new();

        for (id, bytes) in scan {
            let entry = decode_entry(&bytes)?;
            match winners.entry(entry.key) {
                MapEntry::Vacant(slot) => {
                    slot.insert((id, bytes));
                }
                MapEntry::Occupied(mut slot) => {
                    let current = slot.get_mut();
                    let challenger_wins = self.policy.wins(
                        &Candidate { id, bytes: &bytes },
                        &Candidate {
                            id: current.0,
                            bytes: &current.1,
                        },
                    );
                    if challenger_wins {
                        losers.push(current.0);
                        *current = (id, bytes);
                    } else {
                        losers.push(id);
                    }
                }
            }
        }

        if !losers.is_empty() {
            debug!(
                sequence = %self.name,
                count = losers.len(),
                "reclaiming losing concurrent entries"
            );
            self.doc.transact(|txn| {
                for id in &losers {
                    txn.delete(&self.name, *id);
                }
            });
        }

        let mut index = self.index.write();
        let mut changed: Vec<String> = Vec::new();
        for (key, (id, _)) in &winners {
            if index.get(key) != Some(id) {
                changed.push(key.clone());
            }
        }
        for key in index.keys() {
            if !winners.contains_key(key) {
                changed.push(key.clone());
            }
        }
        changed.sort();

        *index = winners.into_iter().map(|(k, (id, _))| (k, id)).collect();
        Ok(changed)
    }

    /// Storage accounting for this log.
    pub(crate) fn stats(&self) -> LogStats {
        let reclaimed = self
            .doc
            .with_sequence(&self.name, |seq| seq.map_or(0, |s| s.tombstone_count()));
        LogStats {
            live: self.index.read().len(),
            reclaimed,
            appended: self.appended.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CompactLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompactLog")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_log(doc: &Arc<Doc>) -> CompactLog {
        CompactLog::open(Arc::clone(doc), "data", ResolutionPolicy::Positional).unwrap()
    }

    fn put(key: &str, value: Value) -> LogOp {
        LogOp::Put {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn put_then_get() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);

        log.apply(vec![put("a", Value::from("one"))]).unwrap();

        assert_eq!(log.get("a").unwrap(), Some(Value::from("one")));
        assert_eq!(log.get("missing").unwrap(), None);
    }

    #[test]
    fn rewrite_leaves_one_live_entry() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);

        for i in 0..10 {
            log.apply(vec![put("a", Value::from(i))]).unwrap();
        }

        let stats = log.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.reclaimed, 9);
        assert_eq!(stats.appended, 10);
        assert_eq!(log.get("a").unwrap(), Some(Value::from(9i64)));
    }

    #[test]
    fn delete_reclaims_and_reports() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);

        log.apply(vec![put("a", Value::Null)]).unwrap();
        let changed = log
            .apply(vec![LogOp::Delete {
                key: "a".to_string(),
            }])
            .unwrap();
        assert_eq!(changed, vec!["a".to_string()]);

        // Deleting again is a no-op.
        let changed = log
            .apply(vec![LogOp::Delete {
                key: "a".to_string(),
            }])
            .unwrap();
        assert!(changed.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn batch_reports_keys_in_order_without_duplicates() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);

        let changed = log
            .apply(vec![
                put("b", Value::from(1i64)),
                put("a", Value::from(2i64)),
                put("b", Value::from(3i64)),
            ])
            .unwrap();

        assert_eq!(changed, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(log.get("b").unwrap(), Some(Value::from(3i64)));
    }

    #[test]
    fn entries_are_sorted_and_restartable() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);

        log.apply(vec![
            put("c", Value::from(3i64)),
            put("a", Value::from(1i64)),
            put("b", Value::from(2i64)),
        ])
        .unwrap();

        let keys: Vec<String> = log.entries().unwrap().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        // A second call re-evaluates from scratch.
        let again: Vec<String> = log.entries().unwrap().map(|(k, _)| k).collect();
        assert_eq!(again, keys);
    }

    #[test]
    fn reopen_rebuilds_index_from_scan() {
        let doc = Arc::new(Doc::new());
        {
            let log = open_log(&doc);
            log.apply(vec![put("a", Value::from(1i64)), put("b", Value::from(2i64))])
                .unwrap();
            log.apply(vec![put("a", Value::from(3i64))]).unwrap();
        }

        let reopened = open_log(&doc);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a").unwrap(), Some(Value::from(3i64)));
    }

    #[test]
    fn corrupt_entry_surfaces_on_read() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);
        log.apply(vec![put("a", Value::Null)]).unwrap();

        // Sneak malformed bytes into the sequence behind the log's back.
        doc.transact(|txn| {
            txn.append("data", vec![0xde, 0xad]);
        });

        assert!(log.refresh().is_err());
    }

    #[test]
    fn refresh_resolves_duplicate_keys_to_one_winner() {
        let doc = Arc::new(Doc::new());
        let log = open_log(&doc);
        log.apply(vec![put("a", Value::from("old"))]).unwrap();

        // Simulate a merged concurrent write: a second live entry for
        // the same key appended outside the log's index.
        let entry = encode_entry(&LogEntry {
            key: "a".to_string(),
            value: Value::from("new"),
        })
        .unwrap();
        doc.transact(|txn| {
            txn.append("data", entry);
        });

        let changed = log.refresh().unwrap();
        assert_eq!(changed, vec!["a".to_string()]);
        // Positional policy: the later append wins.
        assert_eq!(log.get("a").unwrap(), Some(Value::from("new")));
        assert_eq!(log.stats().live, 1);
    }
}
