//! Migrate-on-read engine.
//!
//! A store owns exactly one caller-supplied migration function, fixed at
//! construction time: a pure, total function from any registered version
//! to the latest. The engine invokes it after a successful union match
//! and re-validates the output against the latest version. Migration
//! happens only on read; migrated data is never written back into the
//! log implicitly — persisting it is an explicit, caller-initiated
//! write.

use crate::error::{StoreError, StoreResult};
use crate::schema::SchemaRegistry;
use crate::types::SchemaVersion;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

type MigrateFn = Arc<dyn Fn(SchemaVersion, Value) -> Value + Send + Sync>;

/// Runs the caller-supplied migration function and checks its output.
#[derive(Clone)]
pub struct Migrator {
    f: MigrateFn,
}

impl Migrator {
    /// Wraps a migration function.
    ///
    /// The function receives the matched version and the validated row,
    /// and must return the latest-version shape for every registered
    /// version, including the latest itself (where it is typically the
    /// identity). It must be idempotent: migrating its own output again
    /// yields the same output.
    pub fn new(f: impl Fn(SchemaVersion, Value) -> Value + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// A migrator for stores with a single schema version.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(|_, value| value)
    }

    /// Migrates a union-matched row to the latest version.
    ///
    /// Output failing re-validation against the latest version is a bug
    /// in the migration function and is propagated as
    /// [`StoreError::MigrationFailed`] rather than silently dropped.
    pub(crate) fn run(
        &self,
        registry: &SchemaRegistry,
        version: SchemaVersion,
        value: Value,
    ) -> StoreResult<Value> {
        let migrated = (self.f)(version, value);
        registry.validate_latest(&migrated).map_err(|issues| {
            let detail: Vec<String> = issues.iter().map(ToString::to_string).collect();
            StoreError::migration_failed(format!(
                "output from {version} does not match the latest version: {}",
                detail.join("; ")
            ))
        })
    }
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{FieldKind, Shape};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(
            Shape::object()
                .field("id", FieldKind::Text)
                .field("title", FieldKind::Text),
        );
        registry.register(
            Shape::object()
                .field("id", FieldKind::Text)
                .field("title", FieldKind::Text)
                .field("views", FieldKind::Integer),
        );
        registry
    }

    fn add_views() -> Migrator {
        Migrator::new(|version, value| {
            if version == SchemaVersion::new(1) {
                let mut map = value.as_map().cloned().unwrap();
                map.insert("views".into(), Value::from(0i64));
                Value::Map(map)
            } else {
                value
            }
        })
    }

    #[test]
    fn migrates_old_version_to_latest() {
        let registry = registry();
        let v1_row = Value::object([("id", Value::from("1")), ("title", Value::from("Hello"))]);

        let migrated = add_views()
            .run(&registry, SchemaVersion::new(1), v1_row)
            .unwrap();

        assert_eq!(migrated.get("views").and_then(Value::as_integer), Some(0));
    }

    #[test]
    fn latest_version_is_untouched() {
        let registry = registry();
        let v2_row = Value::object([
            ("id", Value::from("1")),
            ("title", Value::from("Hello")),
            ("views", Value::from(7i64)),
        ]);

        let migrated = add_views()
            .run(&registry, SchemaVersion::new(2), v2_row.clone())
            .unwrap();

        assert_eq!(migrated, v2_row);
    }

    #[test]
    fn migration_is_idempotent() {
        let registry = registry();
        let migrator = add_views();
        let v1_row = Value::object([("id", Value::from("1")), ("title", Value::from("Hello"))]);

        let once = migrator
            .run(&registry, SchemaVersion::new(1), v1_row)
            .unwrap();
        let twice = migrator
            .run(&registry, SchemaVersion::new(2), once.clone())
            .unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn bad_migration_output_is_fatal() {
        let registry = registry();
        let broken = Migrator::new(|_, _| Value::from("not a row"));
        let v1_row = Value::object([("id", Value::from("1")), ("title", Value::from("Hello"))]);

        let err = broken
            .run(&registry, SchemaVersion::new(1), v1_row)
            .unwrap_err();

        assert!(matches!(err, StoreError::MigrationFailed { .. }));
    }
}
