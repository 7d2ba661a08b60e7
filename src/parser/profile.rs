use super::fields::{type_name, FieldSpec, RecordReader};
use crate::error::IngestError;
use crate::model::{NormalizedRecord, ParseOutput, Profile};
use serde_json::Value;

const USERNAME: FieldSpec = FieldSpec {
    name: "username",
    aliases: &["/string_map_data/Username/value", "/username"],
    required: true,
};

const FULL_NAME: FieldSpec = FieldSpec {
    name: "full_name",
    aliases: &["/string_map_data/Name/value", "/name", "/full_name"],
    required: false,
};

const BIO: FieldSpec = FieldSpec {
    name: "bio",
    aliases: &["/string_map_data/Bio/value", "/biography", "/bio"],
    required: false,
};

const EMAIL: FieldSpec = FieldSpec {
    name: "email",
    aliases: &["/string_map_data/Email/value", "/email"],
    required: false,
};

const PRIVATE: FieldSpec = FieldSpec {
    name: "private_account",
    aliases: &[
        "/string_map_data/Private Account/value",
        "/private_account",
        "/is_private",
    ],
    required: false,
};

const JOINED: FieldSpec = FieldSpec {
    name: "joined",
    aliases: &[
        "/string_map_data/Date joined/timestamp",
        "/string_map_data/Date joined/value",
        "/date_joined",
    ],
    required: false,
};

/// Current exports wrap the profile in `profile_user: [{string_map_data}]`;
/// legacy `profile.json` is a flat object.
pub fn parse_profile(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    let entries: Vec<&Value> = match root {
        Value::Object(_) => match root.get("profile_user") {
            Some(Value::Array(list)) => list.iter().collect(),
            _ => vec![root],
        },
        other => {
            return Err(IngestError::malformed(format!(
                "expected a profile object, found {}",
                type_name(other)
            )))
        }
    };

    for (index, item) in entries.into_iter().enumerate() {
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        let profile = Profile {
            username: reader.text(&USERNAME),
            full_name: reader.text(&FULL_NAME),
            bio: reader.text(&BIO),
            email: reader.text(&EMAIL),
            private_account: reader.flag(&PRIVATE),
            joined: reader.timestamp(&JOINED),
        };
        out.records.push(NormalizedRecord::Profile(profile));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use serde_json::json;

    #[test]
    fn test_current_profile() {
        let root = json!({"profile_user": [{
            "string_map_data": {
                "Username": {"value": "ada", "timestamp": 0},
                "Name": {"value": "Ada L.", "timestamp": 0},
                "Private Account": {"value": "True", "timestamp": 0}
            }
        }]});
        let mut out = ParseOutput::default();
        parse_profile(&root, &mut out).unwrap();
        let NormalizedRecord::Profile(p) = &out.records[0] else {
            panic!("expected a profile");
        };
        assert_eq!(p.username, Field::Known("ada".to_string()));
        assert_eq!(p.private_account, Field::Known(true));
        assert_eq!(p.bio, Field::Unknown);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_legacy_profile() {
        let root = json!({"username": "ada", "biography": "hello", "private_account": false, "date_joined": "2014-02-01T09:00:00"});
        let mut out = ParseOutput::default();
        parse_profile(&root, &mut out).unwrap();
        let NormalizedRecord::Profile(p) = &out.records[0] else {
            panic!("expected a profile");
        };
        assert_eq!(p.bio, Field::Known("hello".to_string()));
        assert_eq!(p.private_account, Field::Known(false));
        assert!(p.joined.is_known());
    }

    #[test]
    fn test_profile_array_is_malformed() {
        let mut out = ParseOutput::default();
        assert!(parse_profile(&json!([]), &mut out).is_err());
    }
}
