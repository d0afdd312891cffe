//! Duplicate gymnast merging and similarity-based merge suggestions.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use gymdb_storage::{GymDb, MergeCounts};
use serde::Serialize;
use strsim::jaro_winkler;
use tracing::{debug, info};

use crate::config::MergeRules;

pub const DEFAULT_SUGGESTION_THRESHOLD: f64 = 0.93;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Nothing stored under the duplicate name; an earlier merge may already have run.
    NoDuplicate,
    NoCanonical,
    SameName,
    Merged { moved: u64, dropped: u64 },
}

impl From<MergeCounts> for MergeOutcome {
    fn from(counts: MergeCounts) -> Self {
        MergeOutcome::Merged {
            moved: counts.moved,
            dropped: counts.dropped,
        }
    }
}

/// Fold `duplicate` into `canonical`. Missing names are a no-op, not an error.
pub async fn merge(db: &GymDb, duplicate: &str, canonical: &str) -> Result<MergeOutcome> {
    if duplicate == canonical {
        return Ok(MergeOutcome::SameName);
    }
    let Some(dup) = db.find_gymnast(duplicate).await? else {
        debug!(duplicate, "nothing to merge");
        return Ok(MergeOutcome::NoDuplicate);
    };
    let Some(canon) = db.find_gymnast(canonical).await? else {
        debug!(duplicate, canonical, "canonical gymnast missing, merge skipped");
        return Ok(MergeOutcome::NoCanonical);
    };
    let counts = db
        .merge_gymnasts(dup.id, canon.id)
        .await
        .with_context(|| format!("merging {duplicate} into {canonical}"))?;
    info!(duplicate, canonical, moved = counts.moved, dropped = counts.dropped, "merged gymnasts");
    Ok(counts.into())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub merged: usize,
    pub skipped: usize,
    pub scores_moved: u64,
    pub scores_dropped: u64,
}

impl CleanupSummary {
    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Merged { moved, dropped } => {
                self.merged += 1;
                self.scores_moved += moved;
                self.scores_dropped += dropped;
            }
            _ => self.skipped += 1,
        }
    }
}

/// Apply every substring rule and explicit pair from the merge rules file.
pub async fn clean_duplicates(db: &GymDb, rules: &MergeRules) -> Result<CleanupSummary> {
    let mut summary = CleanupSummary::default();

    for rule in &rules.substring_rules {
        for gymnast in db.find_gymnasts_containing(&rule.find).await? {
            let canonical = rule.apply(&gymnast.name);
            summary.record(merge(db, &gymnast.name, &canonical).await?);
        }
    }
    for pair in &rules.pairs {
        summary.record(merge(db, &pair.duplicate, &pair.canonical).await?);
    }

    info!(
        merged = summary.merged,
        skipped = summary.skipped,
        moved = summary.scores_moved,
        dropped = summary.scores_dropped,
        "duplicate cleanup done"
    );
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeSuggestion {
    pub first: String,
    pub second: String,
    pub country_id: Option<i64>,
    pub similarity: f64,
}

fn comparable(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Candidate duplicate pairs within the same country, most similar first. Review only.
pub async fn suggest_merges(db: &GymDb, threshold: f64) -> Result<Vec<MergeSuggestion>> {
    let gymnasts = db.list_gymnasts().await?;
    let mut by_country: BTreeMap<Option<i64>, Vec<(String, String)>> = BTreeMap::new();
    for gymnast in gymnasts {
        let key = comparable(&gymnast.name);
        by_country
            .entry(gymnast.country_id)
            .or_default()
            .push((gymnast.name, key));
    }

    let mut suggestions = Vec::new();
    for (country_id, members) in &by_country {
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let similarity = jaro_winkler(&members[i].1, &members[j].1);
                if similarity >= threshold {
                    suggestions.push(MergeSuggestion {
                        first: members[i].0.clone(),
                        second: members[j].0.clone(),
                        country_id: *country_id,
                        similarity,
                    });
                }
            }
        }
    }
    suggestions.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.first.cmp(&b.first))
    });
    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergePair;
    use gymdb_adapters::Rule;
    use gymdb_core::{Apparatus, MeetDay, ScoreKey};

    async fn scored_gymnast(db: &GymDb, name: &str, country: Option<i64>, meets: &[&str]) -> i64 {
        let gymnast = db.create_gymnast(name, country).await.unwrap();
        let event = db.create_event(Apparatus::BalanceBeam, false).await.unwrap();
        for meet in meets {
            let meet = db.create_meet(meet, None, None).await.unwrap();
            let key = ScoreKey {
                gymnast_id: gymnast.id,
                meet_id: meet.id,
                meet_day: MeetDay::Unspecified,
                event_id: event.id,
                score_num: 1,
            };
            db.insert_score_if_absent(&key, Some(13.0), None).await.unwrap();
        }
        gymnast.id
    }

    #[tokio::test]
    async fn merge_moves_all_scores_and_second_call_is_a_noop() {
        let db = GymDb::in_memory().await.unwrap();
        scored_gymnast(&db, "A", None, &["M1 (2017)", "M2 (2017)", "M3 (2017)"]).await;
        let b = scored_gymnast(&db, "B", None, &[]).await;

        let outcome = merge(&db, "A", "B").await.unwrap();
        assert_eq!(outcome, MergeOutcome::Merged { moved: 3, dropped: 0 });
        assert_eq!(db.scores_for_gymnast(b).await.unwrap().len(), 3);
        assert!(db.find_gymnast("A").await.unwrap().is_none());

        assert_eq!(merge(&db, "A", "B").await.unwrap(), MergeOutcome::NoDuplicate);
        assert_eq!(db.counts().await.unwrap().scores, 3);
    }

    #[tokio::test]
    async fn merge_into_missing_or_same_name_does_nothing() {
        let db = GymDb::in_memory().await.unwrap();
        scored_gymnast(&db, "A", None, &["M1 (2017)"]).await;
        assert_eq!(merge(&db, "A", "Nobody").await.unwrap(), MergeOutcome::NoCanonical);
        assert_eq!(merge(&db, "A", "A").await.unwrap(), MergeOutcome::SameName);
        assert!(db.find_gymnast("A").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn substring_rules_fold_variants_into_canonical_spelling() {
        let db = GymDb::in_memory().await.unwrap();
        let rus = db.create_country("Russia", Some("RUS")).await.unwrap();
        scored_gymnast(&db, "Anastasiia Iliankova", Some(rus.id), &["Euros (2017)", "Jesolo (2017)"]).await;
        let canon = scored_gymnast(&db, "Anastasia Iliankova", None, &["Euros (2017)"]).await;
        scored_gymnast(&db, "Daria Spiridonova", Some(rus.id), &["Euros (2017)"]).await;

        let rules = MergeRules {
            substring_rules: vec![Rule::new("iia ", "ia ")],
            pairs: vec![MergePair {
                duplicate: "Somebody Else".into(),
                canonical: "Daria Spiridonova".into(),
            }],
        };
        let summary = clean_duplicates(&db, &rules).await.unwrap();
        assert_eq!(summary.merged, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.scores_moved, 1);
        assert_eq!(summary.scores_dropped, 1);

        let merged = db.find_gymnast("Anastasia Iliankova").await.unwrap().unwrap();
        assert_eq!(merged.id, canon);
        assert_eq!(merged.country_id, Some(rus.id));
        assert_eq!(db.scores_for_gymnast(canon).await.unwrap().len(), 2);

        let again = clean_duplicates(&db, &rules).await.unwrap();
        assert_eq!(again.merged, 0);
    }

    #[tokio::test]
    async fn suggestions_stay_within_a_country() {
        let db = GymDb::in_memory().await.unwrap();
        let gbr = db.create_country("Great Britain", Some("GBR")).await.unwrap();
        let can = db.create_country("Canada", Some("CAN")).await.unwrap();
        db.create_gymnast("Elissa Downie", Some(gbr.id)).await.unwrap();
        db.create_gymnast("Ellisa Downie", Some(gbr.id)).await.unwrap();
        db.create_gymnast("Elissa Downey", Some(can.id)).await.unwrap();
        db.create_gymnast("Amy Tinkler", Some(gbr.id)).await.unwrap();

        let suggestions = suggest_merges(&db, DEFAULT_SUGGESTION_THRESHOLD).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].country_id, Some(gbr.id));
        assert_eq!(suggestions[0].first, "Elissa Downie");
        assert_eq!(suggestions[0].second, "Ellisa Downie");
        assert!(suggestions[0].similarity >= DEFAULT_SUGGESTION_THRESHOLD);
    }
}
