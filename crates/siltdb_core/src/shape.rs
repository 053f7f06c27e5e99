//! Built-in struct-shape validator.
//!
//! `Shape` covers the common case of map-shaped rows with typed fields
//! and an optional discriminator. Anything it cannot express can be a
//! hand-written [`Validate`] implementation instead.

use crate::schema::{Issue, Validate};
use crate::value::Value;

/// Kind of value a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// Signed integer.
    Integer,
    /// Boolean.
    Bool,
    /// Byte string.
    Bytes,
    /// Array of any values.
    Array,
    /// Nested map.
    Map,
    /// Any value, including null.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => matches!(value, Value::Text(_)),
            FieldKind::Integer => matches!(value, Value::Integer(_)),
            FieldKind::Bool => matches!(value, Value::Bool(_)),
            FieldKind::Bytes => matches!(value, Value::Bytes(_)),
            FieldKind::Array => matches!(value, Value::Array(_)),
            FieldKind::Map => matches!(value, Value::Map(_)),
            FieldKind::Any => true,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Bool => "bool",
            FieldKind::Bytes => "bytes",
            FieldKind::Array => "array",
            FieldKind::Map => "map",
            FieldKind::Any => "any",
        }
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// A map-shaped schema version.
///
/// # Example
///
/// ```
/// use siltdb_core::{FieldKind, Shape};
///
/// let v2 = Shape::object()
///     .discriminant("v", 2)
///     .field("id", FieldKind::Text)
///     .field("title", FieldKind::Text)
///     .field("views", FieldKind::Integer);
/// ```
#[derive(Debug, Clone)]
pub struct Shape {
    fields: Vec<FieldRule>,
    discriminant: Option<(String, i64)>,
    allow_unknown: bool,
}

impl Shape {
    /// Starts an empty map shape.
    #[must_use]
    pub fn object() -> Self {
        Self {
            fields: Vec::new(),
            discriminant: None,
            allow_unknown: false,
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldRule {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    /// Requires an integer field to hold an exact value.
    ///
    /// A discriminant makes versions mutually exclusive, so a row can
    /// only ever match the version it was written against. It is
    /// checked first and short-circuits the remaining field checks.
    #[must_use]
    pub fn discriminant(mut self, name: impl Into<String>, value: i64) -> Self {
        self.discriminant = Some((name.into(), value));
        self
    }

    /// Accepts fields this shape does not declare.
    #[must_use]
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }
}

impl Validate for Shape {
    fn validate(&self, candidate: &Value) -> Result<Value, Vec<Issue>> {
        let Some(map) = candidate.as_map() else {
            return Err(vec![Issue::root("expected a map")]);
        };

        if let Some((name, expected)) = &self.discriminant {
            match map.get(name).and_then(Value::as_integer) {
                Some(found) if found == *expected => {}
                Some(found) => {
                    return Err(vec![Issue::new(
                        name.clone(),
                        format!("discriminant is {found}, expected {expected}"),
                    )]);
                }
                None => {
                    return Err(vec![Issue::new(
                        name.clone(),
                        format!("missing discriminant, expected {expected}"),
                    )]);
                }
            }
        }

        let mut issues = Vec::new();
        for rule in &self.fields {
            match map.get(&rule.name) {
                Some(value) if rule.kind.matches(value) => {}
                Some(_) => issues.push(Issue::new(
                    rule.name.clone(),
                    format!("expected {}", rule.kind.name()),
                )),
                None if rule.required => issues.push(Issue::new(rule.name.clone(), "missing")),
                None => {}
            }
        }

        if !self.allow_unknown {
            for key in map.keys() {
                let declared = self.fields.iter().any(|rule| &rule.name == key)
                    || self
                        .discriminant
                        .as_ref()
                        .is_some_and(|(name, _)| name == key);
                if !declared {
                    issues.push(Issue::new(key.clone(), "unknown field"));
                }
            }
        }

        if issues.is_empty() {
            Ok(candidate.clone())
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_v1() -> Shape {
        Shape::object()
            .field("id", FieldKind::Text)
            .field("title", FieldKind::Text)
    }

    #[test]
    fn accepts_matching_map() {
        let row = Value::object([("id", Value::from("1")), ("title", Value::from("Hello"))]);
        assert!(post_v1().validate(&row).is_ok());
    }

    #[test]
    fn rejects_non_map() {
        let err = post_v1().validate(&Value::from(5i64)).unwrap_err();
        assert_eq!(err[0].message, "expected a map");
    }

    #[test]
    fn reports_missing_and_mistyped_fields() {
        let row = Value::object([("id", Value::from(9i64))]);
        let err = post_v1().validate(&row).unwrap_err();

        assert_eq!(err.len(), 2);
        assert_eq!(err[0].path, "id");
        assert_eq!(err[1].path, "title");
    }

    #[test]
    fn rejects_unknown_fields_by_default() {
        let row = Value::object([
            ("id", Value::from("1")),
            ("title", Value::from("t")),
            ("stray", Value::Null),
        ]);
        let err = post_v1().validate(&row).unwrap_err();
        assert_eq!(err[0].path, "stray");

        assert!(post_v1().allow_unknown().validate(&row).is_ok());
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let shape = post_v1().optional("views", FieldKind::Integer);
        let row = Value::object([("id", Value::from("1")), ("title", Value::from("t"))]);
        assert!(shape.validate(&row).is_ok());

        let bad = Value::object([
            ("id", Value::from("1")),
            ("title", Value::from("t")),
            ("views", Value::from("many")),
        ]);
        assert!(shape.validate(&bad).is_err());
    }

    #[test]
    fn discriminant_short_circuits() {
        let shape = Shape::object()
            .discriminant("v", 2)
            .field("id", FieldKind::Text);

        let wrong = Value::object([("v", Value::from(1i64)), ("id", Value::from("1"))]);
        let err = shape.validate(&wrong).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].path, "v");

        let right = Value::object([("v", Value::from(2i64)), ("id", Value::from("1"))]);
        assert!(shape.validate(&right).is_ok());
    }
}
