//! Table-shaped accessor: rows keyed by their `id` field.

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

fn row_id(row: &Value) -> StoreResult<String> {
    row.get("id")
        .and_then(Value::as_text)
        .map(String::from)
        .ok_or(StoreError::MissingId)
}

/// A table of rows over one compact KV log.
///
/// Rows are whole-value: `set` always replaces the entire row, there is
/// no partial-field update. A row's stored bytes therefore always came
/// from exactly one write and match exactly one schema version — a
/// reader can never observe fields mixed from writes at different
/// versions.
///
/// # Example
///
/// ```
/// use siltdb_core::{FieldKind, Shape, TableStore, Value};
/// use siltdb_crdt::Doc;
/// use std::sync::Arc;
///
/// let doc = Arc::new(Doc::new());
/// let posts = TableStore::builder(doc, "posts")
///     .version(Shape::object()
///         .field("id", FieldKind::Text)
///         .field("title", FieldKind::Text))
///     .build()
///     .unwrap();
///
/// posts
///     .set(Value::object([
///         ("id", Value::from("1")),
///         ("title", Value::from("Hello")),
///     ]))
///     .unwrap();
/// assert!(posts.get("1").unwrap().is_valid());
/// ```
pub struct TableStore {
    inner: StoreInner,
}

impl TableStore {
    /// Starts building a table store over a named sequence in `doc`.
    #[must_use]
    pub fn builder(doc: Arc<Doc>, name: impl Into<String>) -> TableStoreBuilder {
        TableStoreBuilder {
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

    /// Reads a row by id.
    ///
    /// Absent ⇒ `NotFound`; present but matching no registered version
    /// ⇒ `Invalid`; otherwise the row migrated to the latest version.
    pub fn get(&self, id: &str) -> StoreResult<ReadResult> {
        self.inner.read(id)
    }

    /// Writes a full row, keyed by its `id` field.
    ///
    /// No validation happens here — the row is serialized verbatim,
    /// version discriminator and all. The only structural requirement
    /// is the text `id` field the table is keyed by.
    pub fn set(&self, row: Value) -> StoreResult<()> {
        let key = row_id(&row)?;
        self.inner.write(vec![LogOp::Put { key, value: row }])?;
        Ok(())
    }

    /// Writes an arbitrary value under an explicit id.
    ///
    /// Useful for callers that key rows externally; like [`set`], no
    /// validation happens.
    ///
    /// [`set`]: TableStore::set
    pub fn set_raw(&self, id: &str, value: Value) -> StoreResult<()> {
        self.inner.write(vec![LogOp::Put {
            key: id.to_string(),
            value,
        }])?;
        Ok(())
    }

    /// Deletes a row. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> StoreResult<bool> {
        let changed = self.inner.write(vec![LogOp::Delete {
            key: id.to_string(),
        }])?;
        Ok(!changed.is_empty())
    }

    /// Returns true if a live row exists for `id`.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.inner.log().contains(id)
    }

    /// Number of live rows.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.log().len()
    }

    /// Reads every row, valid or not. Re-evaluated on each call.
    pub fn get_all(&self) -> StoreResult<Vec<ReadResult>> {
        Ok(self
            .inner
            .read_all()?
            .into_iter()
            .map(|(_, result)| result)
            .collect())
    }

    /// Reads every row that validates and migrates cleanly.
    pub fn get_all_valid(&self) -> StoreResult<Vec<Value>> {
        Ok(self
            .inner
            .read_all()?
            .into_iter()
            .filter_map(|(_, result)| result.into_valid())
            .collect())
    }

    /// Reads every row that matches no registered version.
    pub fn get_all_invalid(&self) -> StoreResult<Vec<(String, Vec<VersionIssues>)>> {
        Ok(self
            .inner
            .read_all()?
            .into_iter()
            .filter_map(|(_, result)| match result {
                ReadResult::Invalid { id, issues } => Some((id, issues)),
                _ => None,
            })
            .collect())
    }

    /// Valid rows passing a predicate.
    pub fn filter(&self, pred: impl Fn(&Value) -> bool) -> StoreResult<Vec<Value>> {
        Ok(self
            .get_all_valid()?
            .into_iter()
            .filter(|row| pred(row))
            .collect())
    }

    /// First valid row passing a predicate.
    pub fn find(&self, pred: impl Fn(&Value) -> bool) -> StoreResult<Option<Value>> {
        Ok(self.get_all_valid()?.into_iter().find(|row| pred(row)))
    }

    /// Runs a group of writes in one transaction.
    ///
    /// All changes apply atomically with respect to observers, and
    /// exactly one change notification fires regardless of how many
    /// operations the batch holds.
    pub fn batch<F>(&self, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut TableBatch) -> StoreResult<()>,
    {
        let mut batch = TableBatch { ops: Vec::new() };
        f(&mut batch)?;
        self.inner.write(batch.ops)?;
        Ok(())
    }

    /// Registers a change observer.
    ///
    /// Fires once per committed transaction with the changed ids and
    /// the transaction origin; never per individual field mutation.
    pub fn observe(&self, cb: impl Fn(&ChangeSet) + Send + Sync + 'static) -> Subscription {
        self.inner.observe(cb)
    }

    /// Storage accounting for the backing log.
    #[must_use]
    pub fn stats(&self) -> LogStats {
        self.inner.stats()
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("name", &self.name())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Collects operations for [`TableStore::batch`].
pub struct TableBatch {
    ops: Vec<LogOp>,
}

impl TableBatch {
    /// Queues a full-row write keyed by the row's `id` field.
    pub fn set(&mut self, row: Value) -> StoreResult<()> {
        let key = row_id(&row)?;
        self.ops.push(LogOp::Put { key, value: row });
        Ok(())
    }

    /// Queues a write under an explicit id.
    pub fn set_raw(&mut self, id: &str, value: Value) {
        self.ops.push(LogOp::Put {
            key: id.to_string(),
            value,
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, id: &str) {
        self.ops.push(LogOp::Delete {
            key: id.to_string(),
        });
    }
}

/// Builder for [`TableStore`].
pub struct TableStoreBuilder {
    doc: Arc<Doc>,
    name: String,
    registry: SchemaRegistry,
    migrator: Option<Migrator>,
    policy: ResolutionPolicy,
}

impl TableStoreBuilder {
    /// Registers the next schema version.
    ///
    /// Call in the same fixed order at every definition site.
    #[must_use]
    pub fn version(mut self, validator: impl Validate + 'static) -> Self {
        self.registry.register(validator);
        self
    }

    /// Supplies the migration function.
    ///
    /// Must map every registered version to the latest shape; stores
    /// with a single version may omit it.
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
    pub fn build(self) -> StoreResult<TableStore> {
        if self.registry.is_empty() {
            return Err(StoreError::NoVersions);
        }
        let migrator = self.migrator.unwrap_or_else(Migrator::identity);
        let inner = StoreInner::open(self.doc, self.name, self.registry, migrator, self.policy)?;
        Ok(TableStore { inner })
    }
}
