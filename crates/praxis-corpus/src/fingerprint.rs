use chrono::{DateTime, Utc};
use praxis_core::{PraxisError, PraxisResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// Default extensions considered part of a document corpus.
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// Metadata fingerprint of one corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Path relative to the corpus root (or the file name for a single-file
    /// corpus).
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Modification time as unix seconds.
    pub modified_at: i64,
}

/// The fingerprint set recorded when the derived index was last built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Fingerprints of every eligible file, sorted by path.
    pub files: Vec<FileFingerprint>,
    /// sha-256 digest of the fingerprint set; identifies the index build.
    pub digest: String,
    /// When the manifest was recorded.
    pub built_at: DateTime<Utc>,
}

/// Decides whether a derived index is stale with respect to its corpus.
///
/// Fingerprints are recomputed on every check, never cached; the only
/// persistent state is the manifest written by [`record`](Self::record).
pub struct FingerprintTracker {
    corpus_path: PathBuf,
    manifest_path: PathBuf,
    extensions: Vec<String>,
    mtime_tolerance_secs: i64,
}

impl FingerprintTracker {
    /// Track `corpus_path` (a file or directory), persisting the manifest at
    /// `manifest_path`. Eligibility uses [`DEFAULT_EXTENSIONS`].
    pub fn new(corpus_path: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            corpus_path: corpus_path.into(),
            manifest_path: manifest_path.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_string()).collect(),
            mtime_tolerance_secs: 2,
        }
    }

    /// Replace the extension allow-list.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|s| (*s).to_string()).collect();
        self
    }

    fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|allowed| allowed == e))
            .unwrap_or(false)
    }

    fn fingerprint_one(&self, path: &Path, rel: String) -> PraxisResult<FileFingerprint> {
        let meta = std::fs::metadata(path)
            .map_err(|e| PraxisError::CorpusUnavailable(format!("{}: {e}", path.display())))?;
        let modified_at = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileFingerprint {
            path: rel,
            size: meta.len(),
            modified_at,
        })
    }

    /// Compute the current fingerprint set, sorted by path.
    ///
    /// An unreadable corpus location yields `CorpusUnavailable` rather than
    /// an empty set; the caller must treat that as stale, not as fresh.
    pub fn scan(&self) -> PraxisResult<Vec<FileFingerprint>> {
        let root = &self.corpus_path;
        let meta = std::fs::metadata(root)
            .map_err(|e| PraxisError::CorpusUnavailable(format!("{}: {e}", root.display())))?;

        let mut fingerprints = Vec::new();
        if meta.is_file() {
            let name = root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            fingerprints.push(self.fingerprint_one(root, name)?);
        } else {
            // Iterative walk; directories nest but never deeply enough to
            // justify recursion gymnastics.
            let mut stack = vec![root.clone()];
            while let Some(dir) = stack.pop() {
                let entries = std::fs::read_dir(&dir).map_err(|e| {
                    PraxisError::CorpusUnavailable(format!("{}: {e}", dir.display()))
                })?;
                for entry in entries {
                    let entry = entry.map_err(|e| {
                        PraxisError::CorpusUnavailable(format!("{}: {e}", dir.display()))
                    })?;
                    let path = entry.path();
                    if path.is_dir() {
                        stack.push(path);
                    } else if self.is_eligible(&path) {
                        let rel = path
                            .strip_prefix(root)
                            .unwrap_or(&path)
                            .to_string_lossy()
                            .into_owned();
                        fingerprints.push(self.fingerprint_one(&path, rel)?);
                    }
                }
            }
        }

        fingerprints.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(fingerprints)
    }

    fn digest(files: &[FileFingerprint]) -> String {
        let mut hasher = Sha256::new();
        for f in files {
            hasher.update(f.path.as_bytes());
            hasher.update([0x1f]);
            hasher.update(f.size.to_le_bytes());
            hasher.update(f.modified_at.to_le_bytes());
            hasher.update([0x0a]);
        }
        hex::encode(hasher.finalize())
    }

    async fn load_manifest(&self) -> PraxisResult<Option<Manifest>> {
        if !self.manifest_path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&self.manifest_path).await?;
        let manifest: Manifest = serde_json::from_str(&data)
            .map_err(|e| PraxisError::Session(format!("Failed to parse manifest: {e}")))?;
        Ok(Some(manifest))
    }

    /// Whether the derived index needs rebuilding.
    ///
    /// Stale when no manifest exists, the file-path membership changed, or
    /// any file's size/mtime pair differs from its recorded value (mtime
    /// compared with a small tolerance for coarse filesystem clocks).
    /// Read-only: no manifest is written.
    pub async fn is_stale(&self) -> PraxisResult<bool> {
        let current = self.scan()?;
        let Some(manifest) = self.load_manifest().await? else {
            debug!(corpus = %self.corpus_path.display(), "no manifest, corpus is stale");
            return Ok(true);
        };

        if current.len() != manifest.files.len() {
            return Ok(true);
        }
        for (cur, rec) in current.iter().zip(manifest.files.iter()) {
            if cur.path != rec.path || cur.size != rec.size {
                debug!(path = %cur.path, "fingerprint mismatch");
                return Ok(true);
            }
            if (cur.modified_at - rec.modified_at).abs() > self.mtime_tolerance_secs {
                debug!(path = %cur.path, "mtime drifted beyond tolerance");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Persist the current fingerprint set as the new manifest.
    ///
    /// Call only after the derived index has been successfully rebuilt;
    /// recording first would mark a failed build as fresh.
    pub async fn record(&self) -> PraxisResult<Manifest> {
        let files = self.scan()?;
        let manifest = Manifest {
            digest: Self::digest(&files),
            files,
            built_at: Utc::now(),
        };
        if let Some(parent) = self.manifest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&self.manifest_path, json).await?;
        info!(
            corpus = %self.corpus_path.display(),
            files = manifest.files.len(),
            digest = %manifest.digest[..12.min(manifest.digest.len())],
            "recorded corpus manifest"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn tracker_for(tmp: &tempfile::TempDir) -> FingerprintTracker {
        FingerprintTracker::new(tmp.path().join("docs"), tmp.path().join("manifest.json"))
    }

    fn setup(tmp: &tempfile::TempDir) -> FingerprintTracker {
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        write_file(&docs, "a.txt", "alpha");
        write_file(&docs, "b.md", "beta");
        write_file(&docs, "ignored.bin", "binary");
        tracker_for(tmp)
    }

    #[tokio::test]
    async fn test_stale_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        assert!(tracker.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_fresh_after_record() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        tracker.record().await.unwrap();
        assert!(!tracker.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_stale_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        tracker.record().await.unwrap();
        let first = tracker.is_stale().await.unwrap();
        let second = tracker.is_stale().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_new_file_makes_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        tracker.record().await.unwrap();

        write_file(&tmp.path().join("docs"), "c.txt", "gamma");
        assert!(tracker.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_size_change_makes_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        tracker.record().await.unwrap();

        write_file(&tmp.path().join("docs"), "a.txt", "alpha grew longer");
        assert!(tracker.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_ineligible_extensions_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        tracker.record().await.unwrap();

        // A .bin file changing does not invalidate the index.
        write_file(&tmp.path().join("docs"), "ignored.bin", "other bytes!");
        assert!(!tracker.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        let files = tracker.scan().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.md"]);
    }

    #[tokio::test]
    async fn test_single_file_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("only.txt");
        std::fs::write(&file, "solo").unwrap();

        let tracker = FingerprintTracker::new(&file, tmp.path().join("manifest.json"));
        assert!(tracker.is_stale().await.unwrap());
        tracker.record().await.unwrap();
        assert!(!tracker.is_stale().await.unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_corpus_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = FingerprintTracker::new(
            tmp.path().join("does-not-exist"),
            tmp.path().join("manifest.json"),
        );
        let err = tracker.is_stale().await.unwrap_err();
        assert!(matches!(err, PraxisError::CorpusUnavailable(_)));
    }

    #[tokio::test]
    async fn test_digest_changes_with_content() {
        let tmp = tempfile::tempdir().unwrap();
        let tracker = setup(&tmp);
        let first = tracker.record().await.unwrap();

        write_file(&tmp.path().join("docs"), "a.txt", "alpha but different");
        let second = tracker.record().await.unwrap();
        assert_ne!(first.digest, second.digest);
    }
}
