//! KV-shaped accessor: values keyed by fixed logical names.

use crate::conflict::ResolutionPolicy;
use crate::error::{StoreError, StoreResult};
use crate::log::{LogOp, LogStats};
use crate::migrate::Migrator;
use crate::observer::{ChangeSet, Subscription};
use crate::schema::{SchemaRegistry, Validate, VersionIssues};
use crate::store::{ReadResult, StoreInner};
use crate::types::SchemaVersion;
use crate::value::Value;
use siltdb_crdt::Doc;
use std::sync::Arc;

/// A KV store over one compact KV log.
///
/// The same shape as [`TableStore`](crate::TableStore), but keys are
/// fixed logical names chosen by the caller ("settings",
/// "editor-state") rather than row ids, and `get`/`set` move one whole
/// value per key. All registered schema versions apply to every key in
/// the store.
pub struct KvStore {
    inner: StoreInner,
}

impl KvStore {
    /// Starts building a KV store over a named sequence in `doc`.
    #[must_use]
    pub fn builder(doc: Arc<Doc>, name: impl Into<String>) -> KvStoreBuilder {
        KvStoreBuilder {
            doc,
            name: name.into(),
            registry: SchemaRegistry::new(),
            migrator: None,
            policy: ResolutionPolicy::default(),
        }
    }

    /// The underlying sequence name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.log().name()
    }

    /// Reads the value stored under a logical key.
    pub fn get(&self, key: &str) -> StoreResult<ReadResult> {
        self.inner.read(key)
    }

    /// Replaces the value under a logical key. No validation happens.
    pub fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.inner.write(vec![LogOp::Put {
            key: key.to_string(),
            value,
        }])?;
        Ok(())
    }

    /// Deletes the value under a key. Returns whether anything was
    /// removed.
    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        let changed = self.inner.write(vec![LogOp::Delete {
            key: key.to_string(),
        }])?;
        Ok(!changed.is_empty())
    }

    /// Returns true if a live value exists for `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.inner.log().contains(key)
    }

    /// Number of live keys.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.log().len()
    }

    /// All live keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.log().keys()
    }

    /// Reads every key, valid or not. Re-evaluated on each call.
    pub fn get_all(&self) -> StoreResult<Vec<(String, ReadResult)>> {
        self.inner.read_all()
    }

    /// Reads every key whose value validates and migrates cleanly.
    pub fn get_all_valid(&self) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .inner
            .read_all()?
            .into_iter()
            .filter_map(|(key, result)| result.into_valid().map(|value| (key, value)))
            .collect())
    }

    /// Reads every key whose value matches no registered version.
    pub fn get_all_invalid(&self) -> StoreResult<Vec<(String, Vec<VersionIssues>)>> {
        Ok(self
            .inner
            .read_all()?
            .into_iter()
            .filter_map(|(key, result)| match result {
                ReadResult::Invalid { issues, .. } => Some((key, issues)),
                _ => None,
            })
            .collect())
    }

    /// Runs a group of writes in one transaction with a single change
    /// notification.
    pub fn batch<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut KvBatch) -> StoreResult<()>,
    {
        let mut batch = KvBatch { ops: Vec::new() };
        f(&mut batch)?;
        self.inner.write(batch.ops)?;
        Ok(())
    }

    /// Registers a change observer; fires once per committed
    /// transaction.
    pub fn observe(&self, cb: impl Fn(&ChangeSet) + Send + Sync + 'static) -> Subscription {
        self.inner.observe(cb)
    }

    /// Storage accounting for the backing log.
    #[must_use]
    pub fn stats(&self) -> LogStats {
        self.inner.stats()
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("name", &self.name())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Collects operations for [`KvStore::batch`].
pub struct KvBatch {
    ops: Vec<LogOp>,
}

impl KvBatch {
    /// Queues a write.
    pub fn set(&mut self, key: &str, value: Value) {
        self.ops.push(LogOp::Put {
            key: key.to_string(),
            value,
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: &str) {
        self.ops.push(LogOp::Delete {
            key: key.to_string(),
        });
    }
}

/// Builder for [`KvStore`].
pub struct KvStoreBuilder {
    doc: Arc<Doc>,
    name: String,
    registry: SchemaRegistry,
    migrator: Option<Migrator>,
    policy: ResolutionPolicy,
}

impl KvStoreBuilder {
    /// Registers the next schema version.
    #[must_use]
    pub fn version(mut self, validator: impl Validate + 'static) -> Self {
        self.registry.register(validator);
        self
    }

    /// Supplies the migration function.
    #[must_use]
    pub fn migrate(
        mut self,
        f: impl Fn(SchemaVersion, Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.migrator = Some(Migrator::new(f));
        self
    }

    /// Chooses the conflict resolution policy. Defaults to
    /// [`ResolutionPolicy::Positional`].
    #[must_use]
    pub fn policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Opens the store, scanning the backing sequence to build the
    /// live index.
    pub fn build(self) -> StoreResult<KvStore> {
        if self.registry.is_empty() {
            return Err(StoreError::NoVersions);
        }
        let migrator = self.migrator.unwrap_or_else(Migrator::identity);
        let inner = StoreInner::open(self.doc, self.name, self.registry, migrator, self.policy)?;
        Ok(KvStore { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{FieldKind, Shape};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings_store(doc: &Arc<Doc>) -> KvStore {
        KvStore::builder(Arc::clone(doc), "settings")
            .version(Shape::object().field("theme", FieldKind::Text))
            .version(
                Shape::object()
                    .field("theme", FieldKind::Text)
                    .field("font_size", FieldKind::Integer),
            )
            .migrate(|version, value| {
                if version == SchemaVersion::new(1) {
                    let mut map = value.as_map().cloned().unwrap_or_default();
                    map.insert("font_size".into(), Value::from(14i64));
                    Value::Map(map)
                } else {
                    value
                }
            })
            .build()
            .unwrap()
    }

    #[test]
    fn set_then_get_migrates() {
        let doc = Arc::new(Doc::new());
        let settings = settings_store(&doc);

        settings
            .set("ui", Value::object([("theme", Value::from("dark"))]))
            .unwrap();

        let value = settings.get("ui").unwrap().into_valid().unwrap();
        assert_eq!(value.get("theme").and_then(Value::as_text), Some("dark"));
        assert_eq!(
            value.get("font_size").and_then(Value::as_integer),
            Some(14)
        );
    }

    #[test]
    fn missing_key_is_not_found() {
        let doc = Arc::new(Doc::new());
        let settings = settings_store(&doc);

        assert!(matches!(
            settings.get("nope").unwrap(),
            ReadResult::NotFound { .. }
        ));
    }

    #[test]
    fn rewrites_keep_one_live_value_per_key() {
        let doc = Arc::new(Doc::new());
        let settings = settings_store(&doc);

        for theme in ["dark", "light", "sepia"] {
            settings
                .set("ui", Value::object([("theme", Value::from(theme))]))
                .unwrap();
        }

        assert_eq!(settings.count(), 1);
        assert_eq!(settings.stats().reclaimed, 2);
    }

    #[test]
    fn invalid_value_reported_per_key() {
        let doc = Arc::new(Doc::new());
        let settings = settings_store(&doc);

        settings.set("ui", Value::from(42i64)).unwrap();
        settings
            .set("ok", Value::object([("theme", Value::from("dark"))]))
            .unwrap();

        let invalid = settings.get_all_invalid().unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].0, "ui");

        let valid = settings.get_all_valid().unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].0, "ok");
    }

    #[test]
    fn batch_fires_one_notification() {
        let doc = Arc::new(Doc::new());
        let settings = settings_store(&doc);

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let _sub = settings.observe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        settings
            .batch(|tx| {
                tx.set("a", Value::object([("theme", Value::from("dark"))]));
                tx.set("b", Value::object([("theme", Value::from("light"))]));
                tx.delete("missing");
                Ok(())
            })
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(settings.keys(), vec!["a", "b"]);
    }
}
