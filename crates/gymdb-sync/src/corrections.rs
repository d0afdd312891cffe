//! Manual meet date patches applied after a season is loaded.

use anyhow::{Context, Result};
use gymdb_core::{Issue, IssueKind};
use gymdb_storage::GymDb;
use tracing::{debug, info, warn};

use crate::config::SeasonConfig;

/// Fill still-empty meet dates from the season's correction list.
///
/// Stored dates are never overwritten, so applying the list twice changes nothing.
/// Returns the number of meets updated and a LookupMiss issue per unknown meet.
pub async fn apply_date_corrections(db: &GymDb, season: &SeasonConfig) -> Result<(usize, Vec<Issue>)> {
    let label = season.source_label("date-corrections");
    let mut applied = 0usize;
    let mut issues = Vec::new();

    for (idx, correction) in season.date_corrections.iter().enumerate() {
        let name = season.meet_identity(&correction.meet);
        let Some(meet) = db.find_meet(&name).await? else {
            warn!(meet = %name, "date correction names an unknown meet");
            issues.push(Issue::new(
                IssueKind::LookupMiss,
                &label,
                Some(idx + 1),
                format!("{name}: no such meet"),
            ));
            continue;
        };

        let start = meet.start_date.or(Some(correction.start));
        let end = meet.end_date.or(correction.end);
        if start == meet.start_date && end == meet.end_date {
            if meet.start_date != Some(correction.start) {
                debug!(meet = %name, stored = ?meet.start_date, "meet already dated, correction left unapplied");
            }
            continue;
        }

        db.update_meet_dates(meet.id, start, end)
            .await
            .with_context(|| format!("correcting dates of {name}"))?;
        debug!(meet = %name, ?start, ?end, "meet dates corrected");
        applied += 1;
    }

    info!(year = season.year, applied, missing = issues.len(), "date corrections done");
    Ok((applied, issues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, m, d).unwrap()
    }

    fn season() -> SeasonConfig {
        SeasonConfig::from_yaml(
            r#"
year: 2017
sources:
  totals: { url: "https://example.invalid" }
totals_columns: []
date_corrections:
  - { meet: "Brazilian Selection", start: 2017-07-22, end: 2017-07-24 }
  - { meet: "Czech European Championships Test", start: 2017-03-18 }
  - { meet: "Stuttgart World Cup", start: 2017-03-18, end: 2017-03-19 }
  - { meet: "Never Loaded Cup", start: 2017-01-01 }
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn corrections_fill_only_empty_dates() {
        let db = GymDb::in_memory().await.unwrap();
        db.create_meet("Brazilian Selection (2017)", None, None).await.unwrap();
        db.create_meet("Czech European Championships Test (2017)", None, Some(date(3, 19)))
            .await
            .unwrap();
        db.create_meet("Stuttgart World Cup (2017)", Some(date(3, 17)), Some(date(3, 18)))
            .await
            .unwrap();

        let (applied, issues) = apply_date_corrections(&db, &season()).await.unwrap();
        assert_eq!(applied, 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::LookupMiss);
        assert_eq!(issues[0].row, Some(4));

        let brazil = db.find_meet("Brazilian Selection (2017)").await.unwrap().unwrap();
        assert_eq!((brazil.start_date, brazil.end_date), (Some(date(7, 22)), Some(date(7, 24))));
        let czech = db
            .find_meet("Czech European Championships Test (2017)")
            .await
            .unwrap()
            .unwrap();
        assert_eq!((czech.start_date, czech.end_date), (Some(date(3, 18)), Some(date(3, 19))));
        let stuttgart = db.find_meet("Stuttgart World Cup (2017)").await.unwrap().unwrap();
        assert_eq!(stuttgart.start_date, Some(date(3, 17)));

        let (applied_again, _) = apply_date_corrections(&db, &season()).await.unwrap();
        assert_eq!(applied_again, 0);
    }
}
