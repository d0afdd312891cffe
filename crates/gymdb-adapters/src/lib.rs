//! Source adapters: where raw text comes from and how it is turned into rows.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gymdb_storage::{FetchError, HttpFetcher, SnapshotError, SnapshotStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub mod calendar;
pub mod normalize;
pub mod table;

pub use calendar::{
    extract_calendar, parse_date_range, parse_sheet_date, CalendarLayout, DateRange, LocationLayout,
};
pub use normalize::{Rule, RuleSet};
pub use table::{read_table, Column, ColumnSpec, Table, TableRow};

pub const CRATE_NAME: &str = "gymdb-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{label}: no fixture path configured")]
    NoFixture { label: String },
    #[error("{label}: reading fixture {path:?}: {cause}")]
    Fixture {
        label: String,
        path: PathBuf,
        cause: std::io::Error,
    },
    #[error("{label}: storing raw snapshot")]
    Snapshot {
        label: String,
        #[source]
        cause: SnapshotError,
    },
    #[error("{label}: missing header {header:?} for column {column}")]
    MissingHeader {
        label: String,
        column: Column,
        header: String,
    },
    #[error("{label}: header row has {found} columns, expected {expected}")]
    HeaderWidth {
        label: String,
        found: usize,
        expected: usize,
    },
    #[error("{label}: {cause}")]
    Csv {
        label: String,
        #[source]
        cause: csv::Error,
    },
    #[error("invalid selector {0:?}")]
    Selector(String),
    #[error("{label}: page contains no table")]
    NoTable { label: String },
}

/// Where one season input lives: a remote export URL and an optional local copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    #[serde(default)]
    pub fixture: Option<PathBuf>,
}

#[async_trait]
pub trait TextSource: Send + Sync {
    /// Fetch the full text of a source. `label` names it in logs and snapshots.
    async fn fetch_text(
        &self,
        label: &str,
        extension: &str,
        spec: &SourceSpec,
    ) -> Result<String, SourceError>;
}

/// Live network source; every body is snapshotted before it is handed back.
pub struct HttpSource {
    run_id: Uuid,
    http: HttpFetcher,
    snapshots: SnapshotStore,
}

impl HttpSource {
    pub fn new(run_id: Uuid, http: HttpFetcher, snapshots: SnapshotStore) -> Self {
        Self {
            run_id,
            http,
            snapshots,
        }
    }
}

#[async_trait]
impl TextSource for HttpSource {
    async fn fetch_text(
        &self,
        label: &str,
        extension: &str,
        spec: &SourceSpec,
    ) -> Result<String, SourceError> {
        let fetched = self.http.fetch_text(self.run_id, label, &spec.url).await?;
        let snapshot = self
            .snapshots
            .save(fetched.fetched_at, label, extension, fetched.text.as_bytes())
            .await
            .map_err(|cause| SourceError::Snapshot {
                label: label.to_string(),
                cause,
            })?;
        info!(
            source = label,
            bytes = snapshot.bytes,
            snapshot = %snapshot.relative_path.display(),
            reused = snapshot.reused,
            "fetched source"
        );
        Ok(fetched.text)
    }
}

/// Offline source reading the `fixture` path of each spec, relative to `root`.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    root: PathBuf,
}

impl FixtureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl TextSource for FixtureSource {
    async fn fetch_text(
        &self,
        label: &str,
        _extension: &str,
        spec: &SourceSpec,
    ) -> Result<String, SourceError> {
        let Some(rel) = &spec.fixture else {
            return Err(SourceError::NoFixture {
                label: label.to_string(),
            });
        };
        let path = self.root.join(rel);
        debug!(source = label, path = %path.display(), "reading fixture");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|cause| SourceError::Fixture {
                label: label.to_string(),
                path,
                cause,
            })
    }
}
