//! Raw copies of every fetched source, so a season load can be audited or replayed.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("snapshot {path:?}: {source}")]
pub struct SnapshotError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

fn at(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub sha256: String,
    /// Relative to the store root.
    pub relative_path: PathBuf,
    pub bytes: usize,
    /// An identical body was already on disk for the same day and source.
    pub reused: bool,
}

/// Content-addressed layout: `<root>/<YYYY-MM-DD>/<label>/<sha256>.<ext>`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative_path(
        fetched_at: DateTime<Utc>,
        label: &str,
        sha256: &str,
        extension: &str,
    ) -> PathBuf {
        let ext = match extension.trim().trim_start_matches('.') {
            "" => "txt",
            ext => ext,
        };
        PathBuf::from(fetched_at.format("%Y-%m-%d").to_string())
            .join(label)
            .join(format!("{sha256}.{ext}"))
    }

    /// Write `body` unless the same content is already stored. The final file
    /// only ever appears complete: it is written under a temporary name first.
    pub async fn save(
        &self,
        fetched_at: DateTime<Utc>,
        label: &str,
        extension: &str,
        body: &[u8],
    ) -> Result<Snapshot, SnapshotError> {
        let sha256 = hex::encode(Sha256::digest(body));
        let relative_path = Self::relative_path(fetched_at, label, &sha256, extension);
        let path = self.root.join(&relative_path);
        let snapshot = |reused| Snapshot {
            sha256: sha256.clone(),
            relative_path: relative_path.clone(),
            bytes: body.len(),
            reused,
        };

        if fs::try_exists(&path).await.map_err(at(&path))? {
            debug!(source = label, path = %path.display(), "snapshot already stored");
            return Ok(snapshot(true));
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(at(dir))?;
        }

        let partial = path.with_extension(format!("{}.part", Uuid::new_v4().simple()));
        fs::write(&partial, body).await.map_err(at(&partial))?;
        if let Err(source) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(SnapshotError { path, source });
        }
        debug!(source = label, path = %path.display(), bytes = body.len(), "snapshot written");
        Ok(snapshot(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn noon() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2017-12-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn layout_groups_by_day_and_source() {
        let path = SnapshotStore::relative_path(noon(), "2017-totals", "abc123", ".csv");
        assert_eq!(path, PathBuf::from("2017-12-01/2017-totals/abc123.csv"));
        let path = SnapshotStore::relative_path(noon(), "2017-calendar", "abc123", "");
        assert_eq!(path, PathBuf::from("2017-12-01/2017-calendar/abc123.txt"));
    }

    #[tokio::test]
    async fn identical_bodies_are_stored_once() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let csv = b"Name,Country,Meet\nSimone Biles,USA,World Champs QF\n";

        let first = store.save(noon(), "2017-totals", "csv", csv).await.unwrap();
        let second = store.save(noon(), "2017-totals", "csv", csv).await.unwrap();

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.relative_path, second.relative_path);
        assert_eq!(first.bytes, csv.len());
        assert_eq!(
            std::fs::read(dir.path().join(&first.relative_path)).unwrap(),
            csv.to_vec()
        );
        let leftovers = std::fs::read_dir(dir.path().join("2017-12-01/2017-totals"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn hash_is_sha256_of_the_body() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snap = store
            .save(noon(), "2017-calendar", "html", b"hello world")
            .await
            .unwrap();
        assert_eq!(
            snap.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
