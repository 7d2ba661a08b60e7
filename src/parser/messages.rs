use super::fields::{lookup, media_ref, repair_text, type_name, FieldSpec, RecordReader};
use crate::error::IngestError;
use crate::model::{Field, Message, NormalizedRecord, ParseOutput, ParseWarning};
use serde_json::Value;

const THREAD: FieldSpec = FieldSpec {
    name: "thread",
    aliases: &["/thread_path", "/title", "/thread_id"],
    required: false,
};

const SENDER: FieldSpec = FieldSpec {
    name: "sender",
    aliases: &["/sender_name", "/sender", "/from"],
    required: true,
};

const TEXT: FieldSpec = FieldSpec {
    name: "text",
    aliases: &["/content", "/text", "/body"],
    required: false,
};

const TIMESTAMP: FieldSpec = FieldSpec {
    name: "timestamp",
    aliases: &["/timestamp_ms", "/created_at", "/timestamp"],
    required: true,
};

const MESSAGE_MEDIA: &[&str] = &["/photos", "/videos", "/audio_files", "/gifs", "/media"];

/// Parse a message file.
///
/// Current exports hold one thread per `message_N.json` object with a
/// `messages` list. Legacy `messages.json` is an array of conversations, each
/// with `participants` (plain names) and a `conversation` list.
pub fn parse_messages(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    match root {
        Value::Object(_) if root.get("messages").map_or(false, Value::is_array) => {
            parse_thread(root, "/messages", &mut 0, out);
            Ok(())
        }
        Value::Array(threads) => {
            let mut position = 0;
            for (t, thread) in threads.iter().enumerate() {
                let key = ["/conversation", "/messages"]
                    .into_iter()
                    .find(|k| thread.pointer(k).map_or(false, Value::is_array));
                match key {
                    Some(key) => parse_thread(thread, key, &mut position, out),
                    None => out.warnings.push(ParseWarning {
                        record: None,
                        field: "conversation".to_string(),
                        message: format!("thread {} has no message list, skipped", t),
                    }),
                }
            }
            Ok(())
        }
        Value::Object(_) => Err(IngestError::malformed(
            "message object has no \"messages\" list",
        )),
        other => Err(IngestError::malformed(format!(
            "expected a thread object or array of conversations, found {}",
            type_name(other)
        ))),
    }
}

/// `position` numbers entries across every thread in the file, so warnings
/// point at a unique entry.
fn parse_thread(thread: &Value, list_key: &str, position: &mut usize, out: &mut ParseOutput) {
    let name = thread_name(thread);
    let Some(Value::Array(messages)) = thread.pointer(list_key) else {
        return;
    };
    for item in messages {
        let index = *position;
        *position += 1;
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        if !item.is_object() {
            reader.warn("message", "entry is not an object, skipped");
            continue;
        }
        let mut media = reader.media_list(MESSAGE_MEDIA);
        if let Some(Value::String(uri)) = item.get("media_url") {
            media.extend(media_ref(&Value::String(uri.clone())));
        }
        let message = Message {
            thread: name.clone(),
            sender: reader.text(&SENDER),
            text: reader.text(&TEXT),
            timestamp: reader.timestamp(&TIMESTAMP),
            media,
        };
        out.records.push(NormalizedRecord::Message(message));
    }
}

fn thread_name(thread: &Value) -> Field<String> {
    if let Some(Value::String(s)) = lookup(thread, &THREAD) {
        return Field::Known(repair_text(s));
    }
    // Legacy threads are named by their participants.
    match thread.get("participants") {
        Some(Value::Array(people)) => {
            let names: Vec<String> = people
                .iter()
                .filter_map(|p| match p {
                    Value::String(s) => Some(repair_text(s)),
                    Value::Object(_) => p
                        .get("name")
                        .and_then(Value::as_str)
                        .map(repair_text),
                    _ => None,
                })
                .collect();
            if names.is_empty() {
                Field::Unknown
            } else {
                Field::Known(names.join(", "))
            }
        }
        _ => Field::Unknown,
    }
}
