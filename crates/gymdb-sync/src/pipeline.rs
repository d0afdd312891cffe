//! One season run: fetch, parse, build, load, correct, report.

use anyhow::{Context, Result};
use chrono::Utc;
use gymdb_adapters::{
    extract_calendar, read_table, ColumnSpec, FixtureSource, HttpSource, SourceSpec, Table,
    TextSource,
};
use gymdb_core::{CalendarEntry, Issue};
use gymdb_storage::{GymDb, HttpFetcher, SnapshotStore};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::builder::{build_score_rows, SourceTables};
use crate::config::{AppConfig, SeasonConfig};
use crate::corrections::apply_date_corrections;
use crate::report::{RunCounts, RunReport};
use crate::resolve::Resolver;

/// Text source for a run: local fixtures when `offline`, otherwise HTTP with snapshots.
pub fn source_for(config: &AppConfig, run_id: Uuid, offline: bool) -> Result<Box<dyn TextSource>> {
    if offline {
        return Ok(Box::new(FixtureSource::new(config.workspace_root.clone())));
    }
    let http = HttpFetcher::new(config.fetch_config())?;
    let snapshots = SnapshotStore::new(config.artifacts_dir.clone());
    Ok(Box::new(HttpSource::new(run_id, http, snapshots)))
}

async fn fetch_table(
    source: &dyn TextSource,
    season: &SeasonConfig,
    name: &str,
    spec: &SourceSpec,
    columns: &[ColumnSpec],
    issues: &mut Vec<Issue>,
) -> Result<Table> {
    let label = season.source_label(name);
    let text = source
        .fetch_text(&label, "csv", spec)
        .await
        .with_context(|| format!("fetching {label}"))?;
    let (table, mut table_issues) =
        read_table(&label, &text, columns).with_context(|| format!("reading {label}"))?;
    info!(source = %label, rows = table.rows.len(), skipped = table_issues.len(), "parsed sheet");
    issues.append(&mut table_issues);
    Ok(table)
}

async fn fetch_calendar(
    source: &dyn TextSource,
    season: &SeasonConfig,
    spec: &SourceSpec,
    issues: &mut Vec<Issue>,
) -> Result<Vec<CalendarEntry>> {
    let label = season.source_label("calendar");
    let html = source
        .fetch_text(&label, "html", spec)
        .await
        .with_context(|| format!("fetching {label}"))?;
    let (entries, mut calendar_issues) = extract_calendar(&label, &html, season.year, &season.calendar)
        .with_context(|| format!("extracting {label}"))?;
    info!(source = %label, meets = entries.len(), skipped = calendar_issues.len(), "parsed calendar");
    issues.append(&mut calendar_issues);
    Ok(entries)
}

/// Run the full pipeline for one season. Fetch failures abort the season;
/// row-level problems are collected into the returned report.
pub async fn run_season(
    db: &GymDb,
    source: &dyn TextSource,
    season: &SeasonConfig,
    run_id: Uuid,
    offline: bool,
) -> Result<RunReport> {
    let span = info_span!("season", year = season.year, %run_id, offline);
    run_season_inner(db, source, season, run_id, offline)
        .instrument(span)
        .await
}

async fn run_season_inner(
    db: &GymDb,
    source: &dyn TextSource,
    season: &SeasonConfig,
    run_id: Uuid,
    offline: bool,
) -> Result<RunReport> {
    let started_at = Utc::now();
    let mut issues = Vec::new();

    let totals = fetch_table(
        source,
        season,
        "totals",
        &season.sources.totals,
        &season.totals_columns,
        &mut issues,
    )
    .await?;
    let difficulty = match &season.sources.difficulty {
        Some(spec) => Some(
            fetch_table(
                source,
                season,
                "difficulty",
                spec,
                &season.difficulty_columns,
                &mut issues,
            )
            .await?,
        ),
        None => None,
    };
    let calendar = match &season.sources.calendar {
        Some(spec) => Some(fetch_calendar(source, season, spec, &mut issues).await?),
        None => None,
    };

    let built = build_score_rows(
        season,
        SourceTables {
            totals: &totals,
            difficulty: difficulty.as_ref(),
            calendar: calendar.as_deref(),
        },
    );
    issues.extend(built.issues);

    let mut resolver = Resolver::new(db, &season.country_rules, &season.country_aliases).await?;
    let load = resolver.load_rows(&built.rows).await?;

    let (corrections_applied, correction_issues) = apply_date_corrections(db, season).await?;
    issues.extend(correction_issues);

    let report = RunReport {
        run_id,
        season: season.year,
        offline,
        started_at,
        finished_at: Utc::now(),
        counts: RunCounts {
            rows_built: built.rows.len(),
            load,
            corrections_applied,
        },
        issues,
    };
    info!(
        rows = report.counts.rows_built,
        scores_inserted = report.counts.load.scores_inserted,
        scores_skipped = report.counts.load.scores_skipped,
        corrections = corrections_applied,
        issues = report.issues.len(),
        "season loaded"
    );
    Ok(report)
}
