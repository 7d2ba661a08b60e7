//! Liked posts and comments the account made.
//!
//! Legacy exports store each event as a positional array, e.g.
//! `["2019-01-05T10:00:00", "owner"]` for a like and
//! `["2019-01-05T10:00:00", "text", "owner"]` for a comment. Numeric pointers
//! (`/0`, `/1`) address those positions.

use super::fields::{items, FieldSpec, RecordReader};
use crate::error::IngestError;
use crate::model::{CommentEvent, LikeEvent, NormalizedRecord, ParseOutput};
use serde_json::Value;

const LIKE_LIST_KEYS: &[&str] = &["/likes_media_likes", "/media_likes"];
const COMMENT_LIST_KEYS: &[&str] = &["/comments_media_comments", "/media_comments"];

const LIKE_OWNER: FieldSpec = FieldSpec {
    name: "owner",
    aliases: &["/title", "/1", "/owner"],
    required: true,
};

const LIKE_HREF: FieldSpec = FieldSpec {
    name: "href",
    aliases: &["/string_list_data/0/href", "/href"],
    required: false,
};

const LIKE_TIME: FieldSpec = FieldSpec {
    name: "timestamp",
    aliases: &["/string_list_data/0/timestamp", "/0", "/timestamp"],
    required: true,
};

const COMMENT_TEXT: FieldSpec = FieldSpec {
    name: "text",
    aliases: &["/string_map_data/Comment/value", "/1", "/text", "/comment"],
    required: true,
};

const COMMENT_OWNER: FieldSpec = FieldSpec {
    name: "media_owner",
    aliases: &["/string_map_data/Media Owner/value", "/2", "/media_owner"],
    required: false,
};

const COMMENT_TIME: FieldSpec = FieldSpec {
    name: "timestamp",
    aliases: &["/string_map_data/Time/timestamp", "/0", "/timestamp"],
    required: true,
};

fn is_record(item: &Value) -> bool {
    item.is_object() || item.is_array()
}

pub fn parse_likes(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    for (index, item) in items(root, LIKE_LIST_KEYS)?.into_iter().enumerate() {
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        if !is_record(item) {
            reader.warn("like", "entry is neither an object nor an array, skipped");
            continue;
        }
        let like = LikeEvent {
            owner: reader.text(&LIKE_OWNER),
            href: reader.text(&LIKE_HREF),
            timestamp: reader.timestamp(&LIKE_TIME),
        };
        out.records.push(NormalizedRecord::LikeEvent(like));
    }
    Ok(())
}

pub fn parse_comments(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    for (index, item) in items(root, COMMENT_LIST_KEYS)?.into_iter().enumerate() {
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        if !is_record(item) {
            reader.warn("comment", "entry is neither an object nor an array, skipped");
            continue;
        }
        let comment = CommentEvent {
            text: reader.text(&COMMENT_TEXT),
            media_owner: reader.text(&COMMENT_OWNER),
            timestamp: reader.timestamp(&COMMENT_TIME),
        };
        out.records.push(NormalizedRecord::CommentEvent(comment));
    }
    Ok(())
}
