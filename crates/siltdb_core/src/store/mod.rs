//! Typed accessors over the compact KV log.
//!
//! Two shapes share the same machinery: [`TableStore`] keys rows by
//! their `id` field, [`KvStore`] keys values by fixed logical names.
//! Both validate on read only — a write serializes the caller's value
//! verbatim. Runtime validation is reserved for the read path, where
//! data of unknown provenance (older writers, corruption) must be
//! screened.

mod kv;
mod table;

pub use kv::{KvBatch, KvStore, KvStoreBuilder};
pub use table::{TableBatch, TableStore, TableStoreBuilder};

use crate::error::StoreResult;
use crate::log::{CompactLog, LogOp, LogStats};
use crate::migrate::Migrator;
use crate::observer::{ChangeOrigin, ChangeSet, SubscriberSet, Subscription};
use crate::schema::{SchemaRegistry, UnionOutcome, VersionIssues};
use crate::value::Value;
use siltdb_crdt::{Doc, DocSubscription, TxnOrigin};
use std::sync::Arc;
use tracing::error;

/// Outcome of one read.
///
/// Created fresh on every call, never cached. `Invalid` and `NotFound`
/// are normal outcomes a caller branches on, not errors.
#[derive(Debug)]
pub enum ReadResult {
    /// The stored row matched a registered version and was migrated to
    /// the latest shape.
    Valid(Value),
    /// The stored row matched no registered version.
    Invalid {
        /// The key that was read.
        id: String,
        /// Per-version rejection reasons.
        issues: Vec<VersionIssues>,
    },
    /// No live entry exists for the key.
    NotFound {
        /// The key that was read.
        id: String,
    },
}

impl ReadResult {
    /// Returns true for `Valid`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ReadResult::Valid(_))
    }

    /// Returns the row if valid.
    #[must_use]
    pub fn valid(&self) -> Option<&Value> {
        match self {
            ReadResult::Valid(row) => Some(row),
            _ => None,
        }
    }

    /// Consumes into the row if valid.
    #[must_use]
    pub fn into_valid(self) -> Option<Value> {
        match self {
            ReadResult::Valid(row) => Some(row),
            _ => None,
        }
    }
}

/// Shared plumbing behind both store shapes.
pub(crate) struct StoreInner {
    log: Arc<CompactLog>,
    registry: Arc<SchemaRegistry>,
    migrator: Migrator,
    subscribers: Arc<SubscriberSet>,
    doc_sub: Option<DocSubscription>,
}

impl StoreInner {
    /// Opens the log and wires the remote-merge notification path.
    pub(crate) fn open(
        doc: Arc<Doc>,
        name: String,
        registry: SchemaRegistry,
        migrator: Migrator,
        policy: crate::conflict::ResolutionPolicy,
    ) -> StoreResult<Self> {
        let registry = Arc::new(registry);
        let subscribers = Arc::new(SubscriberSet::default());
        let log = Arc::new(CompactLog::open(doc, name, policy)?);

        // The closure holds weak references so a dropped store does no
        // further work if the document outlives it.
        let weak_log = Arc::downgrade(&log);
        let weak_subs = Arc::downgrade(&subscribers);
        let sequence = log.name().to_string();
        let doc_sub = log.doc().observe(move |summary| {
            if summary.origin != TxnOrigin::Remote
                || !summary.sequences.iter().any(|s| s == &sequence)
            {
                return;
            }
            let (Some(log), Some(subs)) = (weak_log.upgrade(), weak_subs.upgrade()) else {
                return;
            };
            match log.refresh() {
                Ok(keys) if !keys.is_empty() => subs.notify(&ChangeSet {
                    keys,
                    origin: ChangeOrigin::Remote,
                }),
                Ok(_) => {}
                // Corrupt remote data is surfaced on the next read; the
                // merge itself cannot return it to anyone.
                Err(e) => error!(sequence = %sequence, error = %e, "refresh after remote merge failed"),
            }
        });

        Ok(Self {
            log,
            registry,
            migrator,
            subscribers,
            doc_sub: Some(doc_sub),
        })
    }

    pub(crate) fn log(&self) -> &CompactLog {
        &self.log
    }

    /// Full read path: log lookup, union validation, migration.
    pub(crate) fn read(&self, key: &str) -> StoreResult<ReadResult> {
        match self.log.get(key)? {
            None => Ok(ReadResult::NotFound { id: key.to_string() }),
            Some(value) => self.classify(key, value),
        }
    }

    /// Validation and migration for an already-fetched value.
    pub(crate) fn classify(&self, key: &str, value: Value) -> StoreResult<ReadResult> {
        match self.registry.union_validate(&value) {
            UnionOutcome::NoMatch { issues } => Ok(ReadResult::Invalid {
                id: key.to_string(),
                issues,
            }),
            UnionOutcome::Match { version, value } => Ok(ReadResult::Valid(
                self.migrator.run(&self.registry, version, value)?,
            )),
        }
    }

    /// Applies operations in one transaction and notifies subscribers
    /// exactly once.
    pub(crate) fn write(&self, ops: Vec<LogOp>) -> StoreResult<Vec<String>> {
        let changed = self.log.apply(ops)?;
        if !changed.is_empty() {
            self.subscribers.notify(&ChangeSet {
                keys: changed.clone(),
                origin: ChangeOrigin::Local,
            });
        }
        Ok(changed)
    }

    /// Reads every live entry through the full read path.
    pub(crate) fn read_all(&self) -> StoreResult<Vec<(String, ReadResult)>> {
        self.log
            .entries()?
            .map(|(key, value)| {
                let result = self.classify(&key, value)?;
                Ok((key, result))
            })
            .collect()
    }

    pub(crate) fn observe(
        &self,
        cb: impl Fn(&ChangeSet) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribers.subscribe(Arc::new(cb))
    }

    pub(crate) fn stats(&self) -> LogStats {
        self.log.stats()
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(sub) = self.doc_sub.take() {
            sub.cancel();
        }
    }
}
