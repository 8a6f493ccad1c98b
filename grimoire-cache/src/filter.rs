//! Filter expression builder
//!
//! Compiles caller-supplied `name -> value` filters into a [`Predicate`].
//! Names resolve through the record type's indexed-field table; anything not
//! in that table (other than `document` and the `_min`/`_max` range forms) is
//! rejected before storage is touched.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::record::{FieldKind, IndexedField, Record, RecordType, ScalarValue};

/// Filter name reserved for provenance matching
pub const DOCUMENT_FILTER: &str = "document";

/// Caller-supplied filters; arrays compile to membership tests
pub type Filters = BTreeMap<String, Value>;

/// What a clause tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Field(IndexedField),
    /// Matches either `document_key` or `document_name`
    Document,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(ScalarValue),
    In(Vec<ScalarValue>),
    Gte(ScalarValue),
    Lte(ScalarValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub target: Target,
    pub op: Op,
}

impl Clause {
    fn matches(&self, record: &Record) -> bool {
        match self.target {
            Target::Document => {
                let key = ScalarValue::Text(record.document_key.clone());
                let name = ScalarValue::Text(record.document_name.clone());
                match &self.op {
                    Op::Eq(v) => key.matches(v) || name.matches(v),
                    Op::In(vs) => vs.iter().any(|v| key.matches(v) || name.matches(v)),
                    // Ranges on documents are rejected at build time
                    Op::Gte(_) | Op::Lte(_) => false,
                }
            }
            Target::Field(field) => {
                let Some(actual) = record.fields.get(field) else {
                    return false;
                };
                match &self.op {
                    Op::Eq(v) => actual.matches(v),
                    Op::In(vs) => vs.iter().any(|v| actual.matches(v)),
                    Op::Gte(v) => matches!(
                        actual.compare(v),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    Op::Lte(v) => matches!(
                        actual.compare(v),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                }
            }
        }
    }
}

/// Compiled filter, a conjunction of clauses
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every clause must hold; no clauses matches everything
    All(Vec<Clause>),
    /// Statically empty result (an empty membership list)
    Nothing,
}

impl Predicate {
    /// Predicate matching every record
    pub fn everything() -> Self {
        Self::All(Vec::new())
    }

    /// True when the result is known to be empty without reading storage
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    /// True when no clause restricts the result
    pub fn is_unfiltered(&self) -> bool {
        matches!(self, Self::All(clauses) if clauses.is_empty())
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All(clauses) => clauses.iter().all(|c| c.matches(record)),
            Self::Nothing => false,
        }
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::everything()
    }
}

/// Builds predicates for one record type
#[derive(Debug, Clone, Copy)]
pub struct FilterExpressionBuilder {
    record_type: RecordType,
}

/// How a filter name resolved against the allowlist
enum Resolved {
    Document,
    Equal(IndexedField),
    Min(IndexedField),
    Max(IndexedField),
}

impl FilterExpressionBuilder {
    pub fn new(record_type: RecordType) -> Self {
        Self { record_type }
    }

    /// Compile filters into a predicate.
    ///
    /// Every name is validated before any short-circuit, so a bad name is
    /// reported even when another filter is an empty list.
    pub fn build(&self, filters: &Filters) -> Result<Predicate> {
        let mut clauses = Vec::with_capacity(filters.len());
        let mut empty_list = false;

        for (name, value) in filters {
            let resolved = self.resolve(name)?;
            if value.is_null() {
                log::debug!("Ignoring null filter '{}'", name);
                continue;
            }

            let clause = match (resolved, value) {
                (Resolved::Document, Value::Array(items)) => {
                    empty_list |= items.is_empty();
                    Clause {
                        target: Target::Document,
                        op: Op::In(self.coerce_all(name, FieldKind::Text, items)?),
                    }
                }
                (Resolved::Document, v) => Clause {
                    target: Target::Document,
                    op: Op::Eq(self.coerce(name, FieldKind::Text, v)?),
                },
                (Resolved::Equal(field), Value::Array(items)) => {
                    empty_list |= items.is_empty();
                    Clause {
                        target: Target::Field(field),
                        op: Op::In(self.coerce_all(name, field.kind(), items)?),
                    }
                }
                (Resolved::Equal(field), v) => Clause {
                    target: Target::Field(field),
                    op: Op::Eq(self.coerce(name, field.kind(), v)?),
                },
                (Resolved::Min(_) | Resolved::Max(_), Value::Array(_)) => {
                    return Err(CacheError::validation(format!(
                        "range filter '{}' takes a single value",
                        name
                    )))
                }
                (Resolved::Min(field), v) => Clause {
                    target: Target::Field(field),
                    op: Op::Gte(self.coerce_bound(name, field.kind(), v)?),
                },
                (Resolved::Max(field), v) => Clause {
                    target: Target::Field(field),
                    op: Op::Lte(self.coerce_bound(name, field.kind(), v)?),
                },
            };
            clauses.push(clause);
        }

        if empty_list {
            return Ok(Predicate::Nothing);
        }
        Ok(Predicate::All(clauses))
    }

    fn resolve(&self, name: &str) -> Result<Resolved> {
        if name == DOCUMENT_FILTER {
            return Ok(Resolved::Document);
        }
        if let Some(field) = self.record_type.field_by_name(name) {
            return Ok(Resolved::Equal(field));
        }

        let range = name
            .strip_suffix("_min")
            .map(|base| (base, true))
            .or_else(|| name.strip_suffix("_max").map(|base| (base, false)));
        if let Some((base, is_min)) = range {
            if let Some(field) = self.record_type.field_by_name(base) {
                if !field.kind().is_orderable() {
                    return Err(CacheError::validation(format!(
                        "field '{}' on {} does not support range filters",
                        base, self.record_type
                    )));
                }
                return Ok(if is_min {
                    Resolved::Min(field)
                } else {
                    Resolved::Max(field)
                });
            }
        }

        let allowed: Vec<&str> = self
            .record_type
            .indexed_fields()
            .iter()
            .map(IndexedField::name)
            .collect();
        Err(CacheError::validation(format!(
            "unknown filter '{}' for {} (allowed: {}, their _min/_max forms, {})",
            name,
            self.record_type,
            allowed.join(", "),
            DOCUMENT_FILTER
        )))
    }

    fn coerce(&self, name: &str, kind: FieldKind, value: &Value) -> Result<ScalarValue> {
        ScalarValue::coerce(kind, value).ok_or_else(|| self.incompatible(name, kind, value))
    }

    fn incompatible(&self, name: &str, kind: FieldKind, value: &Value) -> CacheError {
        CacheError::validation(format!(
            "filter '{}' has incompatible value {} (expected {:?})",
            name, value, kind
        ))
    }

    /// Range bounds on integer fields may be fractional, e.g. `level_max: 3.5`
    fn coerce_bound(&self, name: &str, kind: FieldKind, value: &Value) -> Result<ScalarValue> {
        match kind {
            FieldKind::Integer => ScalarValue::coerce(FieldKind::Integer, value)
                .or_else(|| ScalarValue::coerce(FieldKind::Number, value))
                .ok_or_else(|| self.incompatible(name, kind, value)),
            _ => self.coerce(name, kind, value),
        }
    }

    fn coerce_all(&self, name: &str, kind: FieldKind, values: &[Value]) -> Result<Vec<ScalarValue>> {
        values.iter().map(|v| self.coerce(name, kind, v)).collect()
    }
}

/// Convert a JSON object into filters; `null` yields no filters
pub fn filters_from_json(value: Value) -> Result<Filters> {
    match value {
        Value::Null => Ok(Filters::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(CacheError::validation(format!(
            "filters must be a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spell(slug: &str, level: i64, school: &str, document: &str) -> Record {
        Record::from_payload(
            RecordType::Spell,
            json!({
                "slug": slug,
                "name": slug,
                "level": level,
                "school": school,
                "document_name": document,
            }),
            "api-a",
        )
        .unwrap()
        .record
    }

    fn filters(value: Value) -> Filters {
        filters_from_json(value).unwrap()
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let err = builder
            .build(&filters(json!({"level; DROP TABLE spells": 1})))
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));

        // Field exists on another type only
        assert!(builder.build(&filters(json!({"armor_class": 12}))).is_err());
        assert!(builder.build(&filters(json!({"armor_class_min": 12}))).is_err());
    }

    #[test]
    fn test_range_on_bool_rejected() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        assert!(builder.build(&filters(json!({"ritual_min": true}))).is_err());
        assert!(builder.build(&filters(json!({"level_min": [1, 2]}))).is_err());
    }

    #[test]
    fn test_incompatible_value_rejected() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        assert!(builder.build(&filters(json!({"level": "high"}))).is_err());
    }

    #[test]
    fn test_empty_list_is_nothing() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let predicate = builder.build(&filters(json!({"document": []}))).unwrap();
        assert!(predicate.is_nothing());

        let predicate = builder
            .build(&filters(json!({"school": [], "level": 3})))
            .unwrap();
        assert!(predicate.is_nothing());

        // Name validation still wins over the short-circuit
        assert!(builder
            .build(&filters(json!({"document": [], "bogus": 1})))
            .is_err());
    }

    #[test]
    fn test_compiles_operations() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let predicate = builder
            .build(&filters(json!({"level_min": "3", "level_max": 5, "school": "evocation"})))
            .unwrap();

        let Predicate::All(clauses) = predicate else {
            panic!("expected clauses");
        };
        assert_eq!(clauses.len(), 3);
        assert!(clauses.contains(&Clause {
            target: Target::Field(IndexedField::Level),
            op: Op::Gte(ScalarValue::Integer(3)),
        }));
        assert!(clauses.contains(&Clause {
            target: Target::Field(IndexedField::Level),
            op: Op::Lte(ScalarValue::Integer(5)),
        }));
    }

    #[test]
    fn test_conjunction_and_ranges_match() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let records: Vec<Record> = (0..=9)
            .map(|level| {
                let school = if level % 2 == 0 { "evocation" } else { "abjuration" };
                spell(&format!("spell-{}", level), level, school, "SRD")
            })
            .collect();

        let range = builder
            .build(&filters(json!({"level_min": 3, "level_max": 5})))
            .unwrap();
        let hits: Vec<i64> = records
            .iter()
            .filter(|r| range.matches(r))
            .filter_map(|r| match r.fields.get(IndexedField::Level) {
                Some(ScalarValue::Integer(l)) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(hits, vec![3, 4, 5]);

        let both = builder
            .build(&filters(json!({"level": 4, "school": "Evocation"})))
            .unwrap();
        let hits: Vec<&str> = records
            .iter()
            .filter(|r| both.matches(r))
            .map(|r| r.slug.as_str())
            .collect();
        assert_eq!(hits, vec!["spell-4"]);
    }

    #[test]
    fn test_fractional_bounds_on_integer_fields() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let predicate = builder
            .build(&filters(json!({"level_max": 3.5, "level_min": "2.5"})))
            .unwrap();

        assert!(predicate.matches(&spell("fireball", 3, "evocation", "SRD")));
        assert!(!predicate.matches(&spell("shield", 1, "abjuration", "SRD")));
        assert!(!predicate.matches(&spell("ice-storm", 4, "evocation", "SRD")));

        // Equality still requires an integral value
        assert!(builder.build(&filters(json!({"level": 3.5}))).is_err());

        let creatures = FilterExpressionBuilder::new(RecordType::Creature);
        assert!(creatures
            .build(&filters(json!({"armor_class_min": 12.5})))
            .is_ok());
        assert!(creatures
            .build(&filters(json!({"armor_class_min": "high"})))
            .is_err());
    }

    #[test]
    fn test_document_matches_key_or_name() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let record = spell("fireball", 3, "evocation", "Systems Reference Document");

        let by_key = builder
            .build(&filters(json!({"document": "systems-reference-document"})))
            .unwrap();
        assert!(by_key.matches(&record));

        let by_list = builder
            .build(&filters(json!({"document": ["tob", "Systems Reference Document"]})))
            .unwrap();
        assert!(by_list.matches(&record));

        let other = builder.build(&filters(json!({"document": "tob"}))).unwrap();
        assert!(!other.matches(&record));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let mut record = spell("mystery", 1, "divination", "SRD");
        record.fields = crate::record::IndexedFields::empty(RecordType::Spell);

        let predicate = builder.build(&filters(json!({"level_max": 9}))).unwrap();
        assert!(!predicate.matches(&record));
        assert!(Predicate::everything().matches(&record));
    }

    #[test]
    fn test_null_filter_ignored() {
        let builder = FilterExpressionBuilder::new(RecordType::Spell);
        let predicate = builder.build(&filters(json!({"level": null}))).unwrap();
        assert!(predicate.is_unfiltered());
    }
}
