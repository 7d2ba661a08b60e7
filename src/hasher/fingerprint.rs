use crate::error::IngestError;
use crate::model::SourceFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use twox_hash::XxHash64;

const READ_BUFFER_LENGTH: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// Path + size + modification time. Never opens the file.
    #[default]
    Stat,
    /// BLAKE3 over the full file contents.
    Content,
}

/// Cheap identity proxy for a file's content.
///
/// Equal fingerprints are treated as equal inputs. This is an approximation:
/// a file rewritten with identical size inside the same mtime tick keeps its
/// stat fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fingerprint {
    Stat(u64),
    Content([u8; 32]),
}

impl Fingerprint {
    pub fn of(source: &SourceFile, mode: FingerprintMode) -> Result<Fingerprint, IngestError> {
        match mode {
            FingerprintMode::Stat => Ok(Fingerprint::from_stat(
                &source.path,
                source.size,
                source.modified,
            )),
            FingerprintMode::Content => {
                Fingerprint::from_content(&source.path).map_err(|e| IngestError::io(&source.path, &e))
            }
        }
    }

    /// Include subsec_nanos so two writes within the same second still differ.
    pub fn from_stat(path: &Path, size: u64, modified: SystemTime) -> Fingerprint {
        let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(path.to_string_lossy().as_bytes());
        hasher.write_u8(0);
        hasher.write_u64(size);
        hasher.write_u64(since_epoch.as_secs());
        hasher.write_u32(since_epoch.subsec_nanos());
        Fingerprint::Stat(hasher.finish())
    }

    pub fn from_content(path: &Path) -> io::Result<Fingerprint> {
        let mut f = File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; READ_BUFFER_LENGTH];
        loop {
            let n = f.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Fingerprint::Content(*hasher.finalize().as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        match self {
            Fingerprint::Stat(h) => format!("s{:016x}", h),
            Fingerprint::Content(bytes) => {
                let mut out = String::with_capacity(1 + bytes.len() * 2);
                out.push('c');
                for b in bytes {
                    out.push_str(&format!("{:02x}", b));
                }
                out
            }
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn read_full_file(file: &Path) -> io::Result<Vec<u8>> {
    let mut f = File::open(file)?;
    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stat_fingerprint_tracks_mtime_nanos() {
        let path = Path::new("/export/posts_1.json");
        let t = UNIX_EPOCH + Duration::new(1_704_448_800, 0);
        let a = Fingerprint::from_stat(path, 10, t);
        let b = Fingerprint::from_stat(path, 10, t + Duration::from_nanos(1));
        assert_ne!(a, b);
        assert_eq!(a, Fingerprint::from_stat(path, 10, t));
    }

    #[test]
    fn test_stat_fingerprint_tracks_size_and_path() {
        let t = UNIX_EPOCH + Duration::from_secs(5);
        let a = Fingerprint::from_stat(Path::new("/a.json"), 10, t);
        assert_ne!(a, Fingerprint::from_stat(Path::new("/a.json"), 11, t));
        assert_ne!(a, Fingerprint::from_stat(Path::new("/b.json"), 10, t));
    }

    #[test]
    fn test_content_fingerprint_ignores_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, b"[1,2,3]").unwrap();
        std::fs::write(&b, b"[1,2,3]").unwrap();
        assert_eq!(
            Fingerprint::from_content(&a).unwrap(),
            Fingerprint::from_content(&b).unwrap()
        );
        assert!(Fingerprint::from_content(&a).unwrap().to_hex().starts_with('c'));
    }
}
