//! Record text extraction for embeddings
//!
//! Each record type concatenates a fixed, ordered list of payload fields after
//! the record name. Missing or empty fields are skipped, so a name-only record
//! still yields usable text.

use serde_json::Value;

use crate::record::{Record, RecordType};

/// Payload keys embedded after the name, in order
fn text_fields(record_type: RecordType) -> &'static [&'static str] {
    match record_type {
        RecordType::Spell => &["desc", "higher_level", "material"],
        RecordType::Creature => &["type", "desc", "actions", "special_abilities"],
        RecordType::Equipment => &["desc", "category", "equipment_category", "properties"],
        RecordType::Rule => &["desc"],
    }
}

/// Text fed to the embedding model for a record
pub fn record_text(record: &Record) -> String {
    let mut parts = vec![record.name.trim().to_string()];

    for key in text_fields(record.record_type()) {
        if let Some(value) = record.payload.get(*key) {
            let text = flatten(value);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    parts.retain(|p| !p.is_empty());
    parts.join("\n")
}

/// Strings as-is, arrays joined, sub-entities by their `name`
fn flatten(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(flatten)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(obj) => obj
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(record_type: RecordType, payload: Value) -> Record {
        Record::from_payload(record_type, payload, "api-a")
            .unwrap()
            .record
    }

    #[test]
    fn test_spell_text_order() {
        let r = record(
            RecordType::Spell,
            json!({
                "slug": "fireball",
                "name": "Fireball",
                "document_name": "SRD",
                "material": "A tiny ball of bat guano",
                "desc": ["A bright streak flashes.", "It explodes."],
                "higher_level": "",
            }),
        );
        assert_eq!(
            record_text(&r),
            "Fireball\nA bright streak flashes. It explodes.\nA tiny ball of bat guano"
        );
    }

    #[test]
    fn test_creature_uses_sub_entity_names() {
        let r = record(
            RecordType::Creature,
            json!({
                "slug": "goblin",
                "name": "Goblin",
                "document_name": "SRD",
                "special_abilities": [{"name": "Nimble Escape", "desc": "Disengage"}],
                "type": "humanoid",
                "subtype": "goblinoid",
                "desc": "Small and wicked.",
                "actions": [{"name": "Scimitar", "desc": "Melee"}, {"name": "Shortbow"}],
            }),
        );
        assert_eq!(
            record_text(&r),
            "Goblin\nhumanoid\nSmall and wicked.\nScimitar Shortbow\nNimble Escape"
        );
    }

    #[test]
    fn test_name_only_record() {
        let r = record(
            RecordType::Rule,
            json!({"slug": "cover", "name": "Cover", "document_name": "SRD"}),
        );
        assert_eq!(record_text(&r), "Cover");
    }
}
