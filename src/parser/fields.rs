use super::timestamp::parse_timestamp;
use crate::error::IngestError;
use crate::model::{Field, MediaRef, MediaType, ParseWarning};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A normalized field and the JSON pointers it may live under.
///
/// `aliases` is in priority order: the current-generation location first, then
/// legacy locations. The first alias that resolves to a non-null value wins,
/// even when later aliases are also present.
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required: bool,
}

pub fn lookup<'a>(item: &'a Value, spec: &FieldSpec) -> Option<&'a Value> {
    spec.aliases
        .iter()
        .filter_map(|pointer| item.pointer(pointer))
        .find(|v| !v.is_null())
}

/// Collect the items of a list-shaped payload.
///
/// A top-level array is the list itself. A top-level object must carry at
/// least one of `list_keys`; lists under several keys are concatenated in key
/// order. Anything else cannot be parsed under any known generation.
pub fn items<'a>(root: &'a Value, list_keys: &[&str]) -> Result<Vec<&'a Value>, IngestError> {
    match root {
        Value::Array(list) => Ok(list.iter().collect()),
        Value::Object(_) => {
            let mut found = false;
            let mut out = Vec::new();
            for key in list_keys {
                if let Some(Value::Array(list)) = root.pointer(key) {
                    found = true;
                    out.extend(list.iter());
                }
            }
            if found {
                Ok(out)
            } else {
                Err(IngestError::malformed(format!(
                    "object has none of the expected keys: {}",
                    list_keys.join(", ")
                )))
            }
        }
        other => Err(IngestError::malformed(format!(
            "expected an array or object at top level, found {}",
            type_name(other)
        ))),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Undo the Latin-1 escaping that some exports apply to UTF-8 text.
///
/// Every char must fit in a byte and the bytes must form valid UTF-8;
/// otherwise the text is returned unchanged.
pub fn repair_text(s: &str) -> String {
    if s.is_ascii() || s.chars().any(|c| c as u32 > 0xFF) {
        return s.to_string();
    }
    let bytes: Vec<u8> = s.chars().map(|c| c as u32 as u8).collect();
    String::from_utf8(bytes).unwrap_or_else(|_| s.to_string())
}

/// Field extraction for one record, collecting warnings as it goes.
pub struct RecordReader<'a, 'w> {
    item: &'a Value,
    index: usize,
    warnings: &'w mut Vec<ParseWarning>,
}

impl<'a, 'w> RecordReader<'a, 'w> {
    pub fn new(item: &'a Value, index: usize, warnings: &'w mut Vec<ParseWarning>) -> Self {
        Self {
            item,
            index,
            warnings,
        }
    }

    pub fn item(&self) -> &'a Value {
        self.item
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.push(ParseWarning {
            record: Some(self.index),
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn resolve(&mut self, spec: &FieldSpec) -> Option<&'a Value> {
        let found = lookup(self.item, spec);
        if found.is_none() && spec.required {
            self.warn(spec.name, "missing from every known schema generation");
        }
        found
    }

    pub fn text(&mut self, spec: &FieldSpec) -> Field<String> {
        match self.resolve(spec) {
            None => Field::Unknown,
            Some(Value::String(s)) => Field::Known(repair_text(s)),
            Some(Value::Number(n)) => Field::Known(n.to_string()),
            Some(other) => {
                let message = format!("expected text, found {}", type_name(other));
                self.warn(spec.name, message);
                Field::Unknown
            }
        }
    }

    /// Engagement counts. Absence stays `Unknown`; it is never read as zero.
    pub fn count(&mut self, spec: &FieldSpec) -> Field<u64> {
        let value = match self.resolve(spec) {
            None => return Field::Unknown,
            Some(v) => v,
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().replace(',', "").parse::<u64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) => Field::Known(n),
            None => {
                self.warn(spec.name, format!("not a count: {}", value));
                Field::Unknown
            }
        }
    }

    pub fn flag(&mut self, spec: &FieldSpec) -> Field<bool> {
        let value = match self.resolve(spec) {
            None => return Field::Unknown,
            Some(v) => v,
        };
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_u64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        match parsed {
            Some(b) => Field::Known(b),
            None => {
                self.warn(spec.name, format!("not a boolean: {}", value));
                Field::Unknown
            }
        }
    }

    /// Unparseable timestamps are a warning on this record, not a failure.
    pub fn timestamp(&mut self, spec: &FieldSpec) -> Field<DateTime<Utc>> {
        let value = match self.resolve(spec) {
            None => return Field::Unknown,
            Some(v) => v,
        };
        match parse_timestamp(value) {
            Some(ts) => Field::Known(ts),
            None => {
                self.warn(spec.name, format!("unparseable timestamp: {}", value));
                Field::Unknown
            }
        }
    }

    pub fn media_type(&mut self, spec: &FieldSpec) -> Field<MediaType> {
        match self.text(spec) {
            Field::Known(label) => Field::Known(MediaType::from_label(&label)),
            Field::Unknown => Field::Unknown,
        }
    }

    /// Read media references from the given list pointers. Each entry may be
    /// an object with a uri, or a bare uri string.
    pub fn media_list(&mut self, list_pointers: &[&str]) -> Vec<MediaRef> {
        let item = self.item;
        let mut media = Vec::new();
        for pointer in list_pointers {
            let Some(Value::Array(list)) = item.pointer(pointer) else {
                continue;
            };
            for entry in list {
                match media_ref(entry) {
                    Some(m) => media.push(m),
                    None => self.warn("media", format!("unusable media entry under {}", pointer)),
                }
            }
        }
        media
    }
}

const MEDIA_URI: FieldSpec = FieldSpec {
    name: "uri",
    aliases: &["/uri", "/path", "/url", "/media_url"],
    required: true,
};

const MEDIA_KIND: FieldSpec = FieldSpec {
    name: "media_type",
    aliases: &["/media_type", "/media_metadata/media_type", "/type"],
    required: false,
};

/// A media reference; the type falls back to the uri's extension.
pub fn media_ref(entry: &Value) -> Option<MediaRef> {
    let uri = match entry {
        Value::String(s) => s.clone(),
        Value::Object(_) => match lookup(entry, &MEDIA_URI)? {
            Value::String(s) => s.clone(),
            _ => return None,
        },
        _ => return None,
    };
    let explicit = lookup(entry, &MEDIA_KIND)
        .and_then(Value::as_str)
        .map(MediaType::from_label);
    let media_type = explicit.or_else(|| MediaType::from_uri(&uri)).into();
    Some(MediaRef { uri, media_type })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NAME: FieldSpec = FieldSpec {
        name: "name",
        aliases: &["/string_map_data/Name/value", "/name", "/full_name"],
        required: true,
    };

    const LIKES: FieldSpec = FieldSpec {
        name: "like_count",
        aliases: &["/like_count", "/likes"],
        required: false,
    };

    #[test]
    fn test_first_alias_wins() {
        let item = json!({"name": "legacy", "string_map_data": {"Name": {"value": "current"}}, "full_name": "other"});
        let mut warnings = Vec::new();
        let mut reader = RecordReader::new(&item, 0, &mut warnings);
        assert_eq!(reader.text(&NAME), Field::Known("current".to_string()));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_null_alias_falls_through() {
        let item = json!({"name": null, "full_name": "Ada"});
        let mut warnings = Vec::new();
        let mut reader = RecordReader::new(&item, 0, &mut warnings);
        assert_eq!(reader.text(&NAME), Field::Known("Ada".to_string()));
    }

    #[test]
    fn test_missing_required_field_warns() {
        let item = json!({});
        let mut warnings = Vec::new();
        let mut reader = RecordReader::new(&item, 3, &mut warnings);
        assert_eq!(reader.text(&NAME), Field::Unknown);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].record, Some(3));
        assert_eq!(warnings[0].field, "name");
    }

    #[test]
    fn test_missing_count_is_unknown_not_zero() {
        let item = json!({});
        let mut warnings = Vec::new();
        let mut reader = RecordReader::new(&item, 0, &mut warnings);
        assert_eq!(reader.count(&LIKES), Field::Unknown);

        let item = json!({"likes": 0});
        let mut reader = RecordReader::new(&item, 0, &mut warnings);
        assert_eq!(reader.count(&LIKES), Field::Known(0));
    }

    #[test]
    fn test_items_shapes() {
        assert_eq!(items(&json!([1, 2]), &["/posts"]).unwrap().len(), 2);
        let merged = json!({"photos": [1], "videos": [2, 3]});
        assert_eq!(items(&merged, &["/photos", "/videos"]).unwrap().len(), 3);
        assert!(items(&json!({"other": []}), &["/photos"]).is_err());
        assert!(items(&json!("text"), &["/photos"]).is_err());
    }

    #[test]
    fn test_repair_text() {
        assert_eq!(repair_text("caf\u{00c3}\u{00a9}"), "café");
        assert_eq!(repair_text("plain"), "plain");
        assert_eq!(repair_text("\u{00e9}t\u{00e9}"), "\u{00e9}t\u{00e9}");
        assert_eq!(repair_text("snow \u{2603}"), "snow \u{2603}");
    }

    #[test]
    fn test_media_ref_type_fallback() {
        let m = media_ref(&json!({"uri": "media/stories/1.mp4"})).unwrap();
        assert_eq!(m.media_type, Field::Known(MediaType::Video));
        let m = media_ref(&json!({"uri": "media/x", "media_type": "photo"})).unwrap();
        assert_eq!(m.media_type, Field::Known(MediaType::Photo));
        let m = media_ref(&json!("media/x")).unwrap();
        assert_eq!(m.media_type, Field::Unknown);
        assert!(media_ref(&json!(42)).is_none());
    }
}
