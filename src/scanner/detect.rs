use super::rules::{self, NameMatch, RuleSet, PEEK_LENGTH};
use crate::error::IngestError;
use crate::model::{Category, MediaType, SchemaGeneration, SourceFile};
use glob::Pattern;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub missing: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn to_result(&self) -> Result<(), IngestError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(IngestError::StructuralValidation {
                missing: self.missing.clone(),
            })
        }
    }
}

/// Everything the detector found under an export root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub root: PathBuf,
    pub files: BTreeMap<Category, Vec<SourceFile>>,
    pub unknown: Vec<PathBuf>,
    /// Entries the walk could not read; their contents are not in `files`.
    pub skipped: Vec<PathBuf>,
    pub media_files: usize,
    pub validation: Validation,
}

impl Detection {
    pub fn recognized_categories(&self) -> usize {
        self.files.values().filter(|v| !v.is_empty()).count()
    }

    pub fn total_files(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn generations(&self) -> BTreeSet<SchemaGeneration> {
        self.files
            .values()
            .flatten()
            .map(|f| f.generation)
            .collect()
    }

    /// All recognized files in category order, then path order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values().flatten()
    }
}

pub struct Detector {
    rules: RuleSet,
    ignore_patterns: Vec<Pattern>,
}

impl Detector {
    pub fn new(ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self {
            rules: RuleSet::new(),
            ignore_patterns,
        }
    }

    /// Walk `root` and classify every file. Only an unreadable root is an error;
    /// unreadable entries below it are logged and listed in `skipped`, and
    /// missing anchors are reported through `Detection::validation`.
    pub fn detect(&self, root: &Path) -> Result<Detection, IngestError> {
        if !root.is_dir() {
            return Err(IngestError::io(
                root,
                &io::Error::new(io::ErrorKind::NotFound, "export root is not a directory"),
            ));
        }
        let root = root.canonicalize().map_err(|e| IngestError::io(root, &e))?;

        let mut files: BTreeMap<Category, Vec<SourceFile>> = BTreeMap::new();
        let mut unknown = Vec::new();
        let mut skipped = Vec::new();
        let mut media_files = 0usize;

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(&root).to_path_buf();
                    if e.depth() == 0 {
                        let err = e
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                        return Err(IngestError::io(&path, &err));
                    }
                    error!("Access denied or unreadable entry {}: {}", path.display(), e);
                    skipped.push(path);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            let is_json = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);

            if !is_json {
                if MediaType::from_uri(&file_name).is_some() {
                    media_files += 1;
                } else {
                    unknown.push(path.to_path_buf());
                }
                continue;
            }

            let parent = path
                .parent()
                .filter(|dir| *dir != root.as_path())
                .and_then(Path::file_name)
                .map(|dir| dir.to_string_lossy());
            match self.classify(path, parent.as_deref(), &file_name) {
                Some((category, generation)) => {
                    let stat = entry
                        .metadata()
                        .map_err(|e| e.to_string())
                        .and_then(|m| m.modified().map(|t| (m.len(), t)).map_err(|e| e.to_string()));
                    let (size, modified) = match stat {
                        Ok(stat) => stat,
                        Err(e) => {
                            warn!("Skipping {}: cannot read metadata: {}", path.display(), e);
                            skipped.push(path.to_path_buf());
                            continue;
                        }
                    };
                    trace!("{} -> {} ({:?})", path.display(), category, generation);
                    files.entry(category).or_default().push(SourceFile {
                        path: path.to_path_buf(),
                        category,
                        generation,
                        size,
                        modified,
                    });
                }
                None => unknown.push(path.to_path_buf()),
            }
        }

        for list in files.values_mut() {
            list.sort_by(|a, b| a.path.cmp(&b.path));
        }
        unknown.sort();
        skipped.sort();

        let validation = validate(&files);
        debug!(
            "Detected {} files in {} categories, {} unknown, {} media, {} skipped",
            files.values().map(Vec::len).sum::<usize>(),
            files.len(),
            unknown.len(),
            media_files,
            skipped.len(),
        );

        Ok(Detection {
            root,
            files,
            unknown,
            skipped,
            media_files,
            validation,
        })
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }

    fn classify(
        &self,
        path: &Path,
        parent: Option<&str>,
        file_name: &str,
    ) -> Option<(Category, SchemaGeneration)> {
        match self.rules.match_file(parent, file_name) {
            NameMatch::Fixed(category, generation) => Some((category, generation)),
            NameMatch::Peek(hint) => rules::resolve_peek(hint, &peek(path)),
            NameMatch::NoMatch => rules::sniff(&peek(path)),
        }
    }
}

fn peek(path: &Path) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(PEEK_LENGTH);
    match File::open(path) {
        Ok(f) => {
            if let Err(e) = f.take(PEEK_LENGTH as u64).read_to_end(&mut buffer) {
                error!("Error peeking '{}': {}", path.display(), e);
                buffer.clear();
            }
        }
        Err(e) => error!("Error opening '{}': {}", path.display(), e),
    }
    buffer
}

fn validate(files: &BTreeMap<Category, Vec<SourceFile>>) -> Validation {
    let present = |c: &Category| files.get(c).map(|v| !v.is_empty()).unwrap_or(false);
    let mut missing = Vec::new();
    if !present(&Category::Profile) {
        missing.push(Category::Profile.to_string());
    }
    if !Category::CONTENT.iter().any(present) {
        missing.push("content (posts, stories, reels or messages)".to_string());
    }
    Validation { missing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_root_is_an_error() {
        let detector = Detector::new(&[]);
        assert!(detector.detect(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_validation_requires_profile_and_content() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("profile.json"), r#"{"username": "x"}"#).unwrap();
        let detection = Detector::new(&[]).detect(tmp.path()).unwrap();
        assert!(!detection.validation.is_valid());
        assert_eq!(detection.validation.missing.len(), 1);

        fs::write(tmp.path().join("posts.json"), r#"{"photos": []}"#).unwrap();
        let detection = Detector::new(&[]).detect(tmp.path()).unwrap();
        assert!(detection.validation.is_valid());
        assert!(detection.validation.to_result().is_ok());
    }

    #[test]
    fn test_media_and_unknown_files_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("media/posts")).unwrap();
        fs::write(tmp.path().join("media/posts/1.jpg"), b"\xff\xd8").unwrap();
        fs::write(tmp.path().join("readme.txt"), "hi").unwrap();
        fs::write(tmp.path().join("settings.json"), r#"{"a": 1}"#).unwrap();

        let detection = Detector::new(&[]).detect(tmp.path()).unwrap();
        assert_eq!(detection.media_files, 1);
        assert_eq!(detection.unknown.len(), 2);
        assert_eq!(detection.recognized_categories(), 0);
    }

    #[test]
    fn test_comments_directory_is_classified() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("comments")).unwrap();
        fs::write(
            tmp.path().join("comments/reels_comments.json"),
            r#"[{"string_map_data": {"Comment": {"value": "nice"}}}]"#,
        )
        .unwrap();

        let detection = Detector::new(&[]).detect(tmp.path()).unwrap();
        let comments = &detection.files[&Category::Comment];
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].generation, SchemaGeneration::Current);
        assert!(detection.unknown.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("posts.json"), r#"{"photos": []}"#).unwrap();
        fs::write(tmp.path().join("profile.json"), r#"{"username": "x"}"#).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let readable = fs::read_dir(&locked).is_ok();
        let detection = Detector::new(&[]).detect(tmp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let detection = detection.unwrap();
        assert_eq!(detection.files[&Category::Profile].len(), 1);
        if !readable {
            // Superusers can read the directory anyway.
            assert_eq!(detection.skipped.len(), 1);
            assert!(detection.skipped[0].ends_with("locked"));
            assert!(detection.files.get(&Category::Post).is_none());
        }
    }

    #[test]
    fn test_ignore_patterns_skip_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("old")).unwrap();
        fs::write(tmp.path().join("old/posts.json"), r#"{"photos": []}"#).unwrap();
        fs::write(tmp.path().join("profile.json"), r#"{"username": "x"}"#).unwrap();

        let detection = Detector::new(&["**/old/**".to_string()]).detect(tmp.path()).unwrap();
        assert!(detection.files.get(&Category::Post).is_none());
        assert_eq!(detection.total_files(), 1);
    }
}
