use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Post,
    Story,
    Reel,
    Message,
    Profile,
    LikedPost,
    Comment,
    Unknown,
}

impl Category {
    /// Categories that count as "content" when validating an export.
    pub const CONTENT: [Category; 4] = [
        Category::Post,
        Category::Story,
        Category::Reel,
        Category::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Post => "posts",
            Category::Story => "stories",
            Category::Reel => "reels",
            Category::Message => "messages",
            Category::Profile => "profile",
            Category::LikedPost => "liked_posts",
            Category::Comment => "comments",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemaGeneration {
    Legacy,
    Current,
}

/// A detected input file. Created by the detector, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub category: Category,
    pub generation: SchemaGeneration,
    pub size: u64,
    pub modified: SystemTime,
}

/// A value that may be missing from some schema generations.
///
/// `Unknown` is distinct from any zero or empty value: a post whose export
/// carries no like count has `like_count == Unknown`, not `Known(0)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Field<T> {
    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Known(v) => Field::Known(v),
            Field::Unknown => Field::Unknown,
        }
    }

    pub fn known(self) -> Option<T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Unknown => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Known(v),
            None => Field::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Photo,
    Video,
    Audio,
    Other(String),
}

impl MediaType {
    pub fn from_label(label: &str) -> MediaType {
        match label.trim().to_ascii_lowercase().as_str() {
            "photo" | "image" | "1" => MediaType::Photo,
            "video" | "2" => MediaType::Video,
            "audio" => MediaType::Audio,
            other => MediaType::Other(other.to_string()),
        }
    }

    /// Guess from a file extension; `None` when the extension means nothing.
    pub fn from_uri(uri: &str) -> Option<MediaType> {
        let ext = uri.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "heic" | "gif" => Some(MediaType::Photo),
            "mp4" | "mov" | "webm" | "m4v" => Some(MediaType::Video),
            "m4a" | "mp3" | "aac" | "ogg" => Some(MediaType::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub uri: String,
    pub media_type: Field<MediaType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineComment {
    pub author: Field<String>,
    pub text: Field<String>,
    pub timestamp: Field<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub caption: Field<String>,
    pub media: Vec<MediaRef>,
    pub timestamp: Field<DateTime<Utc>>,
    pub like_count: Field<u64>,
    pub comments: Vec<InlineComment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub uri: Field<String>,
    pub caption: Field<String>,
    pub media_type: Field<MediaType>,
    pub timestamp: Field<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reel {
    pub id: String,
    pub caption: Field<String>,
    pub media: Vec<MediaRef>,
    pub timestamp: Field<DateTime<Utc>>,
    pub like_count: Field<u64>,
    pub play_count: Field<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub thread: Field<String>,
    pub sender: Field<String>,
    pub text: Field<String>,
    pub media: Vec<MediaRef>,
    pub timestamp: Field<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: Field<String>,
    pub full_name: Field<String>,
    pub bio: Field<String>,
    pub email: Field<String>,
    pub private_account: Field<bool>,
    pub joined: Field<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeEvent {
    pub owner: Field<String>,
    pub href: Field<String>,
    pub timestamp: Field<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub text: Field<String>,
    pub media_owner: Field<String>,
    pub timestamp: Field<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizedRecord {
    Post(Post),
    Story(Story),
    Reel(Reel),
    Message(Message),
    Profile(Profile),
    LikeEvent(LikeEvent),
    CommentEvent(CommentEvent),
}

impl NormalizedRecord {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let ts = match self {
            NormalizedRecord::Post(r) => &r.timestamp,
            NormalizedRecord::Story(r) => &r.timestamp,
            NormalizedRecord::Reel(r) => &r.timestamp,
            NormalizedRecord::Message(r) => &r.timestamp,
            NormalizedRecord::Profile(r) => &r.joined,
            NormalizedRecord::LikeEvent(r) => &r.timestamp,
            NormalizedRecord::CommentEvent(r) => &r.timestamp,
        };
        ts.as_ref().known().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub record: Option<usize>,
    pub field: String,
    pub message: String,
}

/// Result of parsing one file. This is the payload stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOutput {
    pub records: Vec<NormalizedRecord>,
    pub warnings: Vec<ParseWarning>,
}
