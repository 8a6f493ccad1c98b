//! Record types and indexed-field schemas
//!
//! Every record type has a fixed table of indexed scalar fields. The table is
//! the allowlist used by the filter builder and the set of values promoted out
//! of the opaque payload at import time.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

/// Category of cached content, each with its own collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Spell,
    Creature,
    Equipment,
    Rule,
}

impl RecordType {
    pub const ALL: [RecordType; 4] = [
        RecordType::Spell,
        RecordType::Creature,
        RecordType::Equipment,
        RecordType::Rule,
    ];

    /// Collection (column family) name
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Spell => "spells",
            Self::Creature => "creatures",
            Self::Equipment => "equipment",
            Self::Rule => "rules",
        }
    }

    /// Indexed scalar fields for this record type, in schema order
    pub fn indexed_fields(&self) -> &'static [IndexedField] {
        use IndexedField::*;
        match self {
            Self::Spell => &[Level, School, Concentration, Ritual, CastingTime],
            Self::Creature => &[
                ChallengeRating,
                CreatureType,
                Size,
                ArmorClass,
                HitPoints,
                Alignment,
            ],
            Self::Equipment => &[Category, Rarity, Cost, Weight, RequiresAttunement],
            Self::Rule => &[Category, Parent],
        }
    }

    /// Resolve a caller-supplied field name against this type's table
    pub fn field_by_name(&self, name: &str) -> Option<IndexedField> {
        self.indexed_fields()
            .iter()
            .copied()
            .find(|f| f.name() == name)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for RecordType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spell" | "spells" => Ok(Self::Spell),
            "creature" | "creatures" | "monster" | "monsters" => Ok(Self::Creature),
            "equipment" | "item" | "items" => Ok(Self::Equipment),
            "rule" | "rules" => Ok(Self::Rule),
            other => Err(CacheError::validation(format!(
                "unknown record type '{}'",
                other
            ))),
        }
    }
}

/// Value kind of an indexed field, decides coercion and comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Number,
    Text,
    Bool,
}

impl FieldKind {
    /// Whether `_min`/`_max` filters make sense for this kind
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Bool)
    }
}

/// Every indexed field known to any record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedField {
    Level,
    School,
    Concentration,
    Ritual,
    CastingTime,
    ChallengeRating,
    CreatureType,
    Size,
    ArmorClass,
    HitPoints,
    Alignment,
    Category,
    Rarity,
    Cost,
    Weight,
    RequiresAttunement,
    Parent,
}

impl IndexedField {
    /// Canonical field name, also the filter name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Level => "level",
            Self::School => "school",
            Self::Concentration => "concentration",
            Self::Ritual => "ritual",
            Self::CastingTime => "casting_time",
            Self::ChallengeRating => "challenge_rating",
            Self::CreatureType => "creature_type",
            Self::Size => "size",
            Self::ArmorClass => "armor_class",
            Self::HitPoints => "hit_points",
            Self::Alignment => "alignment",
            Self::Category => "category",
            Self::Rarity => "rarity",
            Self::Cost => "cost",
            Self::Weight => "weight",
            Self::RequiresAttunement => "requires_attunement",
            Self::Parent => "parent",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Level | Self::ArmorClass | Self::HitPoints => FieldKind::Integer,
            Self::ChallengeRating | Self::Cost | Self::Weight => FieldKind::Number,
            Self::Concentration | Self::Ritual | Self::RequiresAttunement => FieldKind::Bool,
            Self::School
            | Self::CastingTime
            | Self::CreatureType
            | Self::Size
            | Self::Alignment
            | Self::Category
            | Self::Rarity
            | Self::Parent => FieldKind::Text,
        }
    }

    /// Payload keys other producers use for the same field
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::ChallengeRating => &["cr"],
            Self::CreatureType => &["type"],
            Self::Category => &["equipment_category"],
            Self::RequiresAttunement => &["attunement"],
            _ => &[],
        }
    }

    /// Look the field up in a payload, canonical name first
    fn lookup<'a>(&self, payload: &'a Map<String, Value>) -> Option<&'a Value> {
        std::iter::once(self.name())
            .chain(self.aliases().iter().copied())
            .filter_map(|key| payload.get(key))
            .find(|v| !v.is_null())
    }
}

/// A typed scalar held by an indexed field or a filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ScalarValue {
    /// Coerce a JSON value into the given kind, `None` when incompatible
    pub fn coerce(kind: FieldKind, value: &Value) -> Option<ScalarValue> {
        match kind {
            FieldKind::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(ScalarValue::Integer),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .or_else(|| {
                        parse_number(s)
                            .filter(|f| f.is_finite() && f.fract() == 0.0)
                            .map(|f| f as i64)
                    })
                    .map(ScalarValue::Integer),
                _ => None,
            },
            FieldKind::Number => match value {
                Value::Number(n) => n.as_f64().map(ScalarValue::Number),
                Value::String(s) => parse_number(s).map(ScalarValue::Number),
                _ => None,
            },
            FieldKind::Bool => match value {
                Value::Bool(b) => Some(ScalarValue::Bool(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(ScalarValue::Bool(false)),
                    Some(1) => Some(ScalarValue::Bool(true)),
                    _ => None,
                },
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" => Some(ScalarValue::Bool(true)),
                    "false" | "no" | "n" | "0" => Some(ScalarValue::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            FieldKind::Text => match value {
                Value::String(s) if !s.trim().is_empty() => {
                    Some(ScalarValue::Text(s.trim().to_string()))
                }
                Value::Number(n) => Some(ScalarValue::Text(n.to_string())),
                // {"name": "Evocation", "url": ...} style references
                Value::Object(obj) => obj
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| ScalarValue::Text(s.trim().to_string())),
                _ => None,
            },
        }
    }

    /// Equality with numeric widening and case-insensitive text
    pub fn matches(&self, other: &ScalarValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Ordering between compatible values, `None` across kinds
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parse plain numbers and fractions such as "1/2"
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    s.parse().ok()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpellFields {
    pub level: Option<i64>,
    pub school: Option<String>,
    pub concentration: Option<bool>,
    pub ritual: Option<bool>,
    pub casting_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatureFields {
    pub challenge_rating: Option<f64>,
    pub creature_type: Option<String>,
    pub size: Option<String>,
    pub armor_class: Option<i64>,
    pub hit_points: Option<i64>,
    pub alignment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentFields {
    pub category: Option<String>,
    pub rarity: Option<String>,
    pub cost: Option<f64>,
    pub weight: Option<f64>,
    pub requires_attunement: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFields {
    pub category: Option<String>,
    pub parent: Option<String>,
}

/// Indexed scalar fields, one fixed struct per record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexedFields {
    Spell(SpellFields),
    Creature(CreatureFields),
    Equipment(EquipmentFields),
    Rule(RuleFields),
}

/// An indexed field that was present but could not be coerced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoercionWarning {
    pub slug: String,
    pub field: IndexedField,
    pub value: String,
}

impl IndexedFields {
    /// All fields unset
    pub fn empty(record_type: RecordType) -> Self {
        match record_type {
            RecordType::Spell => Self::Spell(SpellFields::default()),
            RecordType::Creature => Self::Creature(CreatureFields::default()),
            RecordType::Equipment => Self::Equipment(EquipmentFields::default()),
            RecordType::Rule => Self::Rule(RuleFields::default()),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Spell(_) => RecordType::Spell,
            Self::Creature(_) => RecordType::Creature,
            Self::Equipment(_) => RecordType::Equipment,
            Self::Rule(_) => RecordType::Rule,
        }
    }

    /// Promote indexed values out of a payload.
    ///
    /// Values that fail coercion are left unset and reported; the caller keeps
    /// the payload intact.
    pub fn from_payload(
        record_type: RecordType,
        slug: &str,
        payload: &Map<String, Value>,
    ) -> (Self, Vec<CoercionWarning>) {
        let mut fields = Self::empty(record_type);
        let mut warnings = Vec::new();

        for field in record_type.indexed_fields() {
            let Some(raw) = field.lookup(payload) else {
                continue;
            };
            match ScalarValue::coerce(field.kind(), raw) {
                Some(value) => fields.set(*field, value),
                None => warnings.push(CoercionWarning {
                    slug: slug.to_string(),
                    field: *field,
                    value: raw.to_string(),
                }),
            }
        }

        (fields, warnings)
    }

    /// Read a field, `None` when unset or not part of this type
    pub fn get(&self, field: IndexedField) -> Option<ScalarValue> {
        use IndexedField as F;
        let int = |v: &Option<i64>| v.map(ScalarValue::Integer);
        let num = |v: &Option<f64>| v.map(ScalarValue::Number);
        let text = |v: &Option<String>| v.clone().map(ScalarValue::Text);
        let flag = |v: &Option<bool>| v.map(ScalarValue::Bool);

        match (self, field) {
            (Self::Spell(s), F::Level) => int(&s.level),
            (Self::Spell(s), F::School) => text(&s.school),
            (Self::Spell(s), F::Concentration) => flag(&s.concentration),
            (Self::Spell(s), F::Ritual) => flag(&s.ritual),
            (Self::Spell(s), F::CastingTime) => text(&s.casting_time),
            (Self::Creature(c), F::ChallengeRating) => num(&c.challenge_rating),
            (Self::Creature(c), F::CreatureType) => text(&c.creature_type),
            (Self::Creature(c), F::Size) => text(&c.size),
            (Self::Creature(c), F::ArmorClass) => int(&c.armor_class),
            (Self::Creature(c), F::HitPoints) => int(&c.hit_points),
            (Self::Creature(c), F::Alignment) => text(&c.alignment),
            (Self::Equipment(e), F::Category) => text(&e.category),
            (Self::Equipment(e), F::Rarity) => text(&e.rarity),
            (Self::Equipment(e), F::Cost) => num(&e.cost),
            (Self::Equipment(e), F::Weight) => num(&e.weight),
            (Self::Equipment(e), F::RequiresAttunement) => flag(&e.requires_attunement),
            (Self::Rule(r), F::Category) => text(&r.category),
            (Self::Rule(r), F::Parent) => text(&r.parent),
            _ => None,
        }
    }

    /// Store an already-coerced value; mismatched kinds are ignored
    fn set(&mut self, field: IndexedField, value: ScalarValue) {
        use IndexedField as F;
        use ScalarValue as V;

        match (self, field, value) {
            (Self::Spell(s), F::Level, V::Integer(i)) => s.level = Some(i),
            (Self::Spell(s), F::School, V::Text(t)) => s.school = Some(t),
            (Self::Spell(s), F::Concentration, V::Bool(b)) => s.concentration = Some(b),
            (Self::Spell(s), F::Ritual, V::Bool(b)) => s.ritual = Some(b),
            (Self::Spell(s), F::CastingTime, V::Text(t)) => s.casting_time = Some(t),
            (Self::Creature(c), F::ChallengeRating, V::Number(n)) => c.challenge_rating = Some(n),
            (Self::Creature(c), F::CreatureType, V::Text(t)) => c.creature_type = Some(t),
            (Self::Creature(c), F::Size, V::Text(t)) => c.size = Some(t),
            (Self::Creature(c), F::ArmorClass, V::Integer(i)) => c.armor_class = Some(i),
            (Self::Creature(c), F::HitPoints, V::Integer(i)) => c.hit_points = Some(i),
            (Self::Creature(c), F::Alignment, V::Text(t)) => c.alignment = Some(t),
            (Self::Equipment(e), F::Category, V::Text(t)) => e.category = Some(t),
            (Self::Equipment(e), F::Rarity, V::Text(t)) => e.rarity = Some(t),
            (Self::Equipment(e), F::Cost, V::Number(n)) => e.cost = Some(n),
            (Self::Equipment(e), F::Weight, V::Number(n)) => e.weight = Some(n),
            (Self::Equipment(e), F::RequiresAttunement, V::Bool(b)) => {
                e.requires_attunement = Some(b)
            }
            (Self::Rule(r), F::Category, V::Text(t)) => r.category = Some(t),
            (Self::Rule(r), F::Parent, V::Text(t)) => r.parent = Some(t),
            _ => {}
        }
    }
}

/// The unit of storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key, unique within a record type
    pub slug: String,
    pub name: String,
    /// Indexed scalars promoted out of the payload
    pub fields: IndexedFields,
    /// Provenance: which publication or imported file
    pub document_name: String,
    pub document_key: String,
    /// Producer that supplied the record
    pub source_api: String,
    /// Full original record
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A normalized record plus the fields that degraded on the way in
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub record: Record,
    pub warnings: Vec<CoercionWarning>,
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        self.fields.record_type()
    }

    /// Build a record from a producer payload.
    ///
    /// Requires an object with a non-empty `slug` and at least one of
    /// `document_name`/`document_key`. Timestamps are provisional; the store
    /// keeps the original `created_at` on re-import.
    pub fn from_payload(
        record_type: RecordType,
        payload: Value,
        source_api: &str,
    ) -> Result<NormalizedRecord> {
        let obj = payload
            .as_object()
            .ok_or_else(|| CacheError::validation("record is not a JSON object"))?;

        let slug = string_field(obj, "slug")
            .ok_or_else(|| CacheError::validation("record is missing 'slug'"))?;
        let name = string_field(obj, "name").unwrap_or_else(|| slug.clone());

        let document_name = string_field(obj, "document_name");
        let document_key = string_field(obj, "document_key");
        let (document_name, document_key) = match (document_name, document_key) {
            (Some(name), Some(key)) => (name, key),
            (Some(name), None) => {
                let key = document_key_for(&name);
                (name, key)
            }
            (None, Some(key)) => (key.clone(), key),
            (None, None) => {
                return Err(CacheError::validation(format!(
                    "record '{}' has neither 'document_name' nor 'document_key'",
                    slug
                )))
            }
        };

        let (fields, warnings) = IndexedFields::from_payload(record_type, &slug, obj);
        let now = Utc::now();

        Ok(NormalizedRecord {
            record: Record {
                slug,
                name,
                fields,
                document_name,
                document_key,
                source_api: source_api.to_string(),
                payload,
                embedding: None,
                created_at: now,
                updated_at: now,
            },
            warnings,
        })
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Derive a document key from a document name: "Tome of Beasts" -> "tome-of-beasts"
pub fn document_key_for(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !key.is_empty() {
                key.push('-');
            }
            pending_dash = false;
            key.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_type_parse() {
        assert_eq!("spells".parse::<RecordType>().unwrap(), RecordType::Spell);
        assert_eq!("Monster".parse::<RecordType>().unwrap(), RecordType::Creature);
        assert!("vehicles".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_field_tables() {
        assert_eq!(
            RecordType::Spell.field_by_name("level"),
            Some(IndexedField::Level)
        );
        assert_eq!(RecordType::Spell.field_by_name("armor_class"), None);
        assert_eq!(
            RecordType::Rule.field_by_name("category"),
            Some(IndexedField::Category)
        );
    }

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(
            ScalarValue::coerce(FieldKind::Integer, &json!("3")),
            Some(ScalarValue::Integer(3))
        );
        assert_eq!(
            ScalarValue::coerce(FieldKind::Integer, &json!(3.0)),
            Some(ScalarValue::Integer(3))
        );
        assert_eq!(ScalarValue::coerce(FieldKind::Integer, &json!(3.5)), None);
        assert_eq!(
            ScalarValue::coerce(FieldKind::Integer, &json!("3.0")),
            Some(ScalarValue::Integer(3))
        );
        assert_eq!(ScalarValue::coerce(FieldKind::Integer, &json!("3.5")), None);
        assert_eq!(
            ScalarValue::coerce(FieldKind::Number, &json!("1/4")),
            Some(ScalarValue::Number(0.25))
        );
        assert_eq!(ScalarValue::coerce(FieldKind::Number, &json!("1/0")), None);
    }

    #[test]
    fn test_coerce_text_and_bool() {
        assert_eq!(
            ScalarValue::coerce(FieldKind::Text, &json!({"name": "Evocation", "url": "/x"})),
            Some(ScalarValue::Text("Evocation".into()))
        );
        assert_eq!(
            ScalarValue::coerce(FieldKind::Bool, &json!("yes")),
            Some(ScalarValue::Bool(true))
        );
        assert_eq!(ScalarValue::coerce(FieldKind::Bool, &json!("maybe")), None);
    }

    #[test]
    fn test_compare_widens_and_folds_case() {
        assert!(ScalarValue::Integer(3).matches(&ScalarValue::Number(3.0)));
        assert!(ScalarValue::Text("Evocation".into()).matches(&ScalarValue::Text("evocation".into())));
        assert_eq!(
            ScalarValue::Bool(true).compare(&ScalarValue::Integer(1)),
            None
        );
    }

    #[test]
    fn test_from_payload_degrades_bad_field() {
        let payload = json!({
            "slug": "goblin",
            "name": "Goblin",
            "document_name": "Systems Reference Document",
            "cr": "1/4",
            "armor_class": [{"type": "armor", "value": 15}],
            "type": "humanoid"
        });
        let normalized = Record::from_payload(RecordType::Creature, payload.clone(), "api-a").unwrap();
        let record = normalized.record;

        assert_eq!(record.document_key, "systems-reference-document");
        assert_eq!(
            record.fields.get(IndexedField::ChallengeRating),
            Some(ScalarValue::Number(0.25))
        );
        assert_eq!(record.fields.get(IndexedField::ArmorClass), None);
        assert_eq!(normalized.warnings.len(), 1);
        assert_eq!(normalized.warnings[0].field, IndexedField::ArmorClass);
        // payload untouched
        assert_eq!(record.payload, payload);
    }

    #[test]
    fn test_from_payload_requires_slug_and_document() {
        let missing_slug = json!({"name": "Nameless", "document_name": "SRD"});
        assert!(matches!(
            Record::from_payload(RecordType::Spell, missing_slug, "api-a"),
            Err(CacheError::Validation(_))
        ));

        let missing_doc = json!({"slug": "orphan"});
        assert!(Record::from_payload(RecordType::Spell, missing_doc, "api-a").is_err());

        let key_only = json!({"slug": "light", "document_key": "srd"});
        let record = Record::from_payload(RecordType::Spell, key_only, "api-a")
            .unwrap()
            .record;
        assert_eq!(record.document_name, "srd");
        assert_eq!(record.name, "light");
    }

    #[test]
    fn test_document_key_for() {
        assert_eq!(document_key_for("SRD"), "srd");
        assert_eq!(document_key_for("  Tome of Beasts (2023) "), "tome-of-beasts-2023");
    }
}
