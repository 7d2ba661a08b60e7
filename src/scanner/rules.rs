use crate::model::{Category, SchemaGeneration};
use glob::Pattern;
use tracing::error;

/// Upper bound on bytes read to disambiguate a file by content.
pub const PEEK_LENGTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    Fixed(Category, SchemaGeneration),
    /// File name is ambiguous; content decides the generation or category.
    Peek(Category),
    NoMatch,
}

enum Resolution {
    Fixed(SchemaGeneration),
    Peek,
}

struct NameRule {
    /// Matched against the file name, or against `parent/file` when the
    /// pattern names a directory.
    pattern: &'static str,
    category: Category,
    resolution: Resolution,
}

// First match wins.
const NAME_RULES: &[NameRule] = &[
    NameRule { pattern: "personal_information.json", category: Category::Profile, resolution: Resolution::Fixed(SchemaGeneration::Current) },
    NameRule { pattern: "profile.json", category: Category::Profile, resolution: Resolution::Fixed(SchemaGeneration::Legacy) },
    NameRule { pattern: "posts_[0-9]*.json", category: Category::Post, resolution: Resolution::Fixed(SchemaGeneration::Current) },
    NameRule { pattern: "posts.json", category: Category::Post, resolution: Resolution::Fixed(SchemaGeneration::Legacy) },
    NameRule { pattern: "media.json", category: Category::Post, resolution: Resolution::Fixed(SchemaGeneration::Legacy) },
    NameRule { pattern: "stories.json", category: Category::Story, resolution: Resolution::Peek },
    NameRule { pattern: "reels.json", category: Category::Reel, resolution: Resolution::Peek },
    NameRule { pattern: "igtv_videos.json", category: Category::Reel, resolution: Resolution::Fixed(SchemaGeneration::Legacy) },
    NameRule { pattern: "message_[0-9]*.json", category: Category::Message, resolution: Resolution::Fixed(SchemaGeneration::Current) },
    NameRule { pattern: "messages.json", category: Category::Message, resolution: Resolution::Fixed(SchemaGeneration::Legacy) },
    NameRule { pattern: "liked_posts.json", category: Category::LikedPost, resolution: Resolution::Fixed(SchemaGeneration::Current) },
    NameRule { pattern: "likes.json", category: Category::LikedPost, resolution: Resolution::Peek },
    NameRule { pattern: "post_comments*.json", category: Category::Comment, resolution: Resolution::Fixed(SchemaGeneration::Current) },
    NameRule { pattern: "comments.json", category: Category::Comment, resolution: Resolution::Fixed(SchemaGeneration::Legacy) },
    NameRule { pattern: "comments/*comments*.json", category: Category::Comment, resolution: Resolution::Fixed(SchemaGeneration::Current) },
];

// Quoted so that `"media_likes"` does not match inside `"likes_media_likes"`.
// Every key of an entry must appear.
const CONTENT_KEYS: &[(&[&str], Category, SchemaGeneration)] = &[
    (&["\"ig_stories\""], Category::Story, SchemaGeneration::Current),
    (&["\"ig_reels_media\""], Category::Reel, SchemaGeneration::Current),
    (&["\"likes_media_likes\""], Category::LikedPost, SchemaGeneration::Current),
    (&["\"comments_media_comments\""], Category::Comment, SchemaGeneration::Current),
    (&["\"profile_user\""], Category::Profile, SchemaGeneration::Current),
    (&["\"participants\""], Category::Message, SchemaGeneration::Current),
    (&["\"media_likes\""], Category::LikedPost, SchemaGeneration::Legacy),
    (&["\"media_comments\""], Category::Comment, SchemaGeneration::Legacy),
    // Current comment exports are bare arrays of `string_map_data` records
    // keyed by `Comment`; other current files share the wrapper.
    (&["\"string_map_data\"", "\"Comment\""], Category::Comment, SchemaGeneration::Current),
];

pub struct RuleSet {
    rules: Vec<(Pattern, &'static NameRule)>,
}

impl RuleSet {
    pub fn new() -> Self {
        let rules = NAME_RULES
            .iter()
            .filter_map(|rule| match Pattern::new(rule.pattern) {
                Ok(p) => Some((p, rule)),
                Err(e) => {
                    error!("Invalid rule pattern '{}': {}", rule.pattern, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn match_name(&self, file_name: &str) -> NameMatch {
        self.match_file(None, file_name)
    }

    /// Match a file by name and, for directory-scoped rules, by the name of
    /// the directory holding it.
    pub fn match_file(&self, parent: Option<&str>, file_name: &str) -> NameMatch {
        let lower = file_name.to_ascii_lowercase();
        let scoped = parent.map(|dir| format!("{}/{}", dir.to_ascii_lowercase(), lower));
        for (pattern, rule) in &self.rules {
            let candidate = if rule.pattern.contains('/') {
                match &scoped {
                    Some(scoped) => scoped.as_str(),
                    None => continue,
                }
            } else {
                lower.as_str()
            };
            if pattern.matches(candidate) {
                return match rule.resolution {
                    Resolution::Fixed(generation) => NameMatch::Fixed(rule.category, generation),
                    Resolution::Peek => NameMatch::Peek(rule.category),
                };
            }
        }
        NameMatch::NoMatch
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve an ambiguous file name using a bounded content prefix.
pub fn resolve_peek(hint: Category, prefix: &[u8]) -> Option<(Category, SchemaGeneration)> {
    match hint {
        Category::Story => Some(if contains(prefix, b"\"ig_stories\"") {
            (Category::Story, SchemaGeneration::Current)
        } else {
            (Category::Story, SchemaGeneration::Legacy)
        }),
        Category::Reel => Some(if contains(prefix, b"\"ig_reels_media\"") {
            (Category::Reel, SchemaGeneration::Current)
        } else {
            (Category::Reel, SchemaGeneration::Legacy)
        }),
        // Legacy likes.json may hold only comment likes, which are not ingested.
        Category::LikedPost => {
            if contains(prefix, b"\"likes_media_likes\"") {
                Some((Category::LikedPost, SchemaGeneration::Current))
            } else if contains(prefix, b"\"media_likes\"") {
                Some((Category::LikedPost, SchemaGeneration::Legacy))
            } else {
                None
            }
        }
        _ => sniff(prefix),
    }
}

/// Classify an unrecognized file name purely by the keys in its prefix.
pub fn sniff(prefix: &[u8]) -> Option<(Category, SchemaGeneration)> {
    CONTENT_KEYS
        .iter()
        .find(|(keys, _, _)| keys.iter().all(|key| contains(prefix, key.as_bytes())))
        .map(|(_, category, generation)| (*category, *generation))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}
