//! Posts, stories and reels.
//!
//! Current exports nest media under a `media` array per item; legacy exports
//! (`media.json`, `stories.json`, `igtv_videos.json`) store one media file per
//! item with `path` / `taken_at` / `caption`.

use super::fields::{items, media_ref, FieldSpec, RecordReader};
use crate::error::IngestError;
use crate::model::{Field, InlineComment, MediaRef, NormalizedRecord, ParseOutput, Post, Reel, Story};
use serde_json::Value;

const POST_LIST_KEYS: &[&str] = &["/ig_posts", "/posts", "/photos", "/videos"];
const STORY_LIST_KEYS: &[&str] = &["/ig_stories", "/stories"];
const REEL_LIST_KEYS: &[&str] = &["/ig_reels_media", "/reels", "/igtv_videos"];

const ID: FieldSpec = FieldSpec {
    name: "id",
    aliases: &["/id", "/media_id", "/pk"],
    required: false,
};

const CAPTION: FieldSpec = FieldSpec {
    name: "caption",
    aliases: &["/title", "/media/0/title", "/caption", "/text"],
    required: false,
};

const TIMESTAMP: FieldSpec = FieldSpec {
    name: "timestamp",
    aliases: &[
        "/creation_timestamp",
        "/media/0/creation_timestamp",
        "/taken_at",
        "/timestamp",
        "/date",
    ],
    required: true,
};

const LIKE_COUNT: FieldSpec = FieldSpec {
    name: "like_count",
    aliases: &["/like_count", "/likes_count", "/likes"],
    required: false,
};

const PLAY_COUNT: FieldSpec = FieldSpec {
    name: "play_count",
    aliases: &["/play_count", "/plays", "/view_count"],
    required: false,
};

const STORY_URI: FieldSpec = FieldSpec {
    name: "uri",
    aliases: &["/uri", "/path", "/media/0/uri"],
    required: true,
};

// Explicit only: a story's media type is never guessed from its file name.
const STORY_MEDIA_TYPE: FieldSpec = FieldSpec {
    name: "media_type",
    aliases: &["/media_type", "/media_metadata/media_type", "/media/0/media_type"],
    required: true,
};

const COMMENT_AUTHOR: FieldSpec = FieldSpec {
    name: "comment.author",
    aliases: &["/string_map_data/Author/value", "/author", "/username"],
    required: false,
};

const COMMENT_TEXT: FieldSpec = FieldSpec {
    name: "comment.text",
    aliases: &["/string_map_data/Comment/value", "/text", "/comment"],
    required: true,
};

const COMMENT_TIME: FieldSpec = FieldSpec {
    name: "comment.timestamp",
    aliases: &["/string_map_data/Time/timestamp", "/timestamp", "/created_at"],
    required: false,
};

pub fn parse_posts(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    for (index, item) in items(root, POST_LIST_KEYS)?.into_iter().enumerate() {
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        if !item.is_object() {
            reader.warn("post", "entry is not an object, skipped");
            continue;
        }
        let media = item_media(&mut reader);
        let id = record_id(&mut reader, &media, "post");
        let post = Post {
            id,
            caption: reader.text(&CAPTION),
            timestamp: reader.timestamp(&TIMESTAMP),
            like_count: reader.count(&LIKE_COUNT),
            comments: inline_comments(&mut reader),
            media,
        };
        out.records.push(NormalizedRecord::Post(post));
    }
    Ok(())
}

pub fn parse_stories(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    for (index, item) in items(root, STORY_LIST_KEYS)?.into_iter().enumerate() {
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        if !item.is_object() {
            reader.warn("story", "entry is not an object, skipped");
            continue;
        }
        let uri = reader.text(&STORY_URI);
        let id = match reader.text(&ID) {
            Field::Known(id) => id,
            Field::Unknown => match &uri {
                Field::Known(uri) => uri.clone(),
                Field::Unknown => format!("story-{}", index),
            },
        };
        let story = Story {
            id,
            caption: reader.text(&CAPTION),
            media_type: reader.media_type(&STORY_MEDIA_TYPE),
            timestamp: reader.timestamp(&TIMESTAMP),
            uri,
        };
        out.records.push(NormalizedRecord::Story(story));
    }
    Ok(())
}

pub fn parse_reels(root: &Value, out: &mut ParseOutput) -> Result<(), IngestError> {
    for (index, item) in items(root, REEL_LIST_KEYS)?.into_iter().enumerate() {
        let mut reader = RecordReader::new(item, index, &mut out.warnings);
        if !item.is_object() {
            reader.warn("reel", "entry is not an object, skipped");
            continue;
        }
        let media = item_media(&mut reader);
        let id = record_id(&mut reader, &media, "reel");
        let reel = Reel {
            id,
            caption: reader.text(&CAPTION),
            timestamp: reader.timestamp(&TIMESTAMP),
            like_count: reader.count(&LIKE_COUNT),
            play_count: reader.count(&PLAY_COUNT),
            media,
        };
        out.records.push(NormalizedRecord::Reel(reel));
    }
    Ok(())
}

/// Current items carry a `media` list; legacy items are themselves the media.
fn item_media(reader: &mut RecordReader<'_, '_>) -> Vec<MediaRef> {
    if reader.item().get("media").map_or(false, Value::is_array) {
        return reader.media_list(&["/media"]);
    }
    match media_ref(reader.item()) {
        Some(m) => vec![m],
        None => {
            reader.warn("media", "no media reference in any known location");
            Vec::new()
        }
    }
}

fn record_id(
    reader: &mut RecordReader<'_, '_>,
    media: &[MediaRef],
    kind: &str,
) -> String {
    match reader.text(&ID) {
        Field::Known(id) => id,
        Field::Unknown => media
            .first()
            .map(|m| m.uri.clone())
            .unwrap_or_else(|| format!("{}-{}", kind, reader.index())),
    }
}

fn inline_comments(reader: &mut RecordReader<'_, '_>) -> Vec<InlineComment> {
    let Some(Value::Array(list)) = reader.item().get("comments") else {
        return Vec::new();
    };
    let mut comments = Vec::with_capacity(list.len());
    for entry in list {
        let mut inner_warnings = Vec::new();
        let mut inner = RecordReader::new(entry, reader.index(), &mut inner_warnings);
        let comment = InlineComment {
            author: inner.text(&COMMENT_AUTHOR),
            text: inner.text(&COMMENT_TEXT),
            timestamp: inner.timestamp(&COMMENT_TIME),
        };
        for w in inner_warnings {
            reader.warn(&w.field, w.message);
        }
        comments.push(comment);
    }
    comments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaType;
    use serde_json::json;

    #[test]
    fn test_current_post_with_nested_media() {
        let root = json!([{
            "media": [
                {"uri": "media/posts/202401/a.jpg", "creation_timestamp": 1704448800, "title": "a"},
                {"uri": "media/posts/202401/b.mp4", "creation_timestamp": 1704448800, "title": ""}
            ],
            "title": "beach",
            "creation_timestamp": 1704448800
        }]);
        let mut out = ParseOutput::default();
        parse_posts(&root, &mut out).unwrap();
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        let NormalizedRecord::Post(post) = &out.records[0] else {
            panic!("expected a post");
        };
        assert_eq!(post.id, "media/posts/202401/a.jpg");
        assert_eq!(post.caption, Field::Known("beach".to_string()));
        assert_eq!(post.media.len(), 2);
        assert_eq!(post.media[1].media_type, Field::Known(MediaType::Video));
        assert_eq!(post.like_count, Field::Unknown);
    }

    #[test]
    fn test_legacy_media_json_photos_and_videos() {
        let root = json!({
            "photos": [{"caption": "one", "taken_at": "2018-06-01T12:00:00+00:00", "path": "photos/201806/1.jpg", "likes": 12}],
            "videos": [{"caption": "two", "taken_at": "2018-06-02T12:00:00", "path": "videos/201806/2.mp4"}]
        });
        let mut out = ParseOutput::default();
        parse_posts(&root, &mut out).unwrap();
        assert_eq!(out.records.len(), 2);
        let NormalizedRecord::Post(first) = &out.records[0] else {
            panic!("expected a post");
        };
        assert_eq!(first.like_count, Field::Known(12));
        assert_eq!(first.caption, Field::Known("one".to_string()));
        assert!(first.timestamp.is_known());
    }

    #[test]
    fn test_post_comments_keep_order() {
        let root = json!([{
            "uri": "a.jpg",
            "creation_timestamp": 1,
            "comments": [{"author": "z", "text": "first"}, {"author": "a", "text": "second"}]
        }]);
        let mut out = ParseOutput::default();
        parse_posts(&root, &mut out).unwrap();
        let NormalizedRecord::Post(post) = &out.records[0] else {
            panic!("expected a post");
        };
        let texts: Vec<_> = post.comments.iter().map(|c| c.text.clone().known().unwrap()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_legacy_story_without_media_type() {
        let root = json!({"stories": [{"path": "stories/201901/1.jpg", "taken_at": "2019-01-05T10:00:00", "caption": "hi"}]});
        let mut out = ParseOutput::default();
        parse_stories(&root, &mut out).unwrap();
        let NormalizedRecord::Story(story) = &out.records[0] else {
            panic!("expected a story");
        };
        assert_eq!(story.media_type, Field::Unknown);
        assert!(out.warnings.iter().any(|w| w.field == "media_type"));
    }

    #[test]
    fn test_current_reels() {
        let root = json!({"ig_reels_media": [{"media": [{"uri": "media/reels/1.mp4", "creation_timestamp": 1704448800, "title": "r"}]}]});
        let mut out = ParseOutput::default();
        parse_reels(&root, &mut out).unwrap();
        let NormalizedRecord::Reel(reel) = &out.records[0] else {
            panic!("expected a reel");
        };
        assert_eq!(reel.caption, Field::Known("r".to_string()));
        assert!(reel.timestamp.is_known());
        assert_eq!(reel.play_count, Field::Unknown);
    }

    #[test]
    fn test_scalar_entries_are_skipped_with_warning() {
        let root = json!([1, {"uri": "a.jpg", "creation_timestamp": 1}]);
        let mut out = ParseOutput::default();
        parse_posts(&root, &mut out).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.warnings.len(), 1);
    }
}
