//! Per-run report written next to other run outputs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gymdb_core::{Issue, IssueKind};
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::resolve::LoadCounts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub rows_built: usize,
    #[serde(flatten)]
    pub load: LoadCounts,
    pub corrections_applied: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub season: i32,
    pub offline: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub issues: Vec<Issue>,
}

impl RunReport {
    pub fn issue_count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Write `<reports_dir>/<run_id>/run_report.json` and return its path.
    pub async fn write(&self, reports_dir: &Path) -> Result<PathBuf> {
        let dir = reports_dir.join(self.run_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join("run_report.json");
        let json = serde_json::to_vec_pretty(self).context("serializing run report")?;
        fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
