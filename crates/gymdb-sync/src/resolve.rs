//! Entity resolver: get-or-create for every stored kind, then idempotent score inserts.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use gymdb_adapters::RuleSet;
use gymdb_core::{Apparatus, Country, Event, Gymnast, Meet, ScoreKey, ScoreRow};
use gymdb_storage::GymDb;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::countries::iso3_for;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounts {
    pub countries_created: usize,
    pub meets_created: usize,
    pub gymnasts_created: usize,
    pub scores_inserted: usize,
    /// Scores whose full key was already stored.
    pub scores_skipped: usize,
}

/// Create the eight (apparatus, junior) events if missing and return them keyed.
pub async fn seed_events(db: &GymDb) -> Result<HashMap<(Apparatus, bool), Event>> {
    let mut events = HashMap::new();
    for apparatus in Apparatus::ALL {
        for junior in [false, true] {
            let event = db
                .create_event(apparatus, junior)
                .await
                .with_context(|| format!("seeding event {apparatus} junior={junior}"))?;
            events.insert((apparatus, junior), event);
        }
    }
    Ok(events)
}

pub struct Resolver<'a> {
    db: &'a GymDb,
    country_rules: &'a RuleSet,
    country_aliases: &'a BTreeMap<String, String>,
    events: HashMap<(Apparatus, bool), Event>,
    counts: LoadCounts,
}

impl<'a> Resolver<'a> {
    pub async fn new(
        db: &'a GymDb,
        country_rules: &'a RuleSet,
        country_aliases: &'a BTreeMap<String, String>,
    ) -> Result<Self> {
        let events = seed_events(db).await?;
        Ok(Self {
            db,
            country_rules,
            country_aliases,
            events,
            counts: LoadCounts::default(),
        })
    }

    pub fn counts(&self) -> LoadCounts {
        self.counts
    }

    /// Canonical spelling of a country: typo rules first, then aliases.
    pub fn canonical_country(&self, raw: &str) -> String {
        let name = self.country_rules.normalize(raw.trim());
        let name = name.trim();
        self.country_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub async fn ensure_country(&mut self, raw: &str) -> Result<Country> {
        let name = self.canonical_country(raw);
        if let Some(country) = self.db.find_country(&name).await? {
            return Ok(country);
        }
        let iso3c = iso3_for(&name);
        if iso3c.is_none() {
            warn!(country = %name, "no ISO3 code known, storing without one");
        }
        let country = self
            .db
            .create_country(&name, iso3c)
            .await
            .with_context(|| format!("creating country {name}"))?;
        self.counts.countries_created += 1;
        debug!(country = %country.name, id = country.id, "created country");
        Ok(country)
    }

    /// Existing meets keep their stored dates; date fixes go through the corrections list.
    pub async fn ensure_meet(
        &mut self,
        name: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        location: Option<&str>,
    ) -> Result<Meet> {
        if let Some(meet) = self.db.find_meet(name).await? {
            return Ok(meet);
        }
        let meet = self
            .db
            .create_meet(name, start_date, end_date)
            .await
            .with_context(|| format!("creating meet {name}"))?;
        self.counts.meets_created += 1;
        debug!(
            meet = %meet.name,
            id = meet.id,
            location = location.unwrap_or(""),
            "created meet"
        );
        Ok(meet)
    }

    pub async fn ensure_gymnast(&mut self, name: &str, country_id: Option<i64>) -> Result<Gymnast> {
        if let Some(gymnast) = self.db.find_gymnast(name).await? {
            return Ok(gymnast);
        }
        let gymnast = self
            .db
            .create_gymnast(name, country_id)
            .await
            .with_context(|| format!("creating gymnast {name}"))?;
        self.counts.gymnasts_created += 1;
        debug!(gymnast = %gymnast.name, id = gymnast.id, "created gymnast");
        Ok(gymnast)
    }

    /// Store one built row: its country, meet and gymnast, then each present score slot.
    pub async fn load_row(&mut self, row: &ScoreRow) -> Result<()> {
        let country_id = match row.country.as_deref() {
            Some(raw) => Some(self.ensure_country(raw).await?.id),
            None => None,
        };
        let meet = self
            .ensure_meet(
                &row.meet_name,
                row.start_date,
                row.end_date,
                row.location.as_deref(),
            )
            .await?;
        let gymnast = self.ensure_gymnast(&row.gymnast, country_id).await?;

        for (slot, value) in row.scores.present() {
            let event = self
                .events
                .get(&(slot.apparatus(), row.junior))
                .with_context(|| format!("event {} junior={} not seeded", slot.apparatus(), row.junior))?;
            let key = ScoreKey {
                gymnast_id: gymnast.id,
                meet_id: meet.id,
                meet_day: row.meet_day,
                event_id: event.id,
                score_num: slot.score_num(),
            };
            if self
                .db
                .insert_score_if_absent(&key, value.score, value.d_score)
                .await
                .with_context(|| format!("inserting {:?} for {}", slot, row.gymnast))?
            {
                self.counts.scores_inserted += 1;
            } else {
                self.counts.scores_skipped += 1;
            }
        }
        Ok(())
    }

    pub async fn load_rows(&mut self, rows: &[ScoreRow]) -> Result<LoadCounts> {
        for row in rows {
            self.load_row(row).await?;
        }
        info!(
            rows = rows.len(),
            countries_created = self.counts.countries_created,
            meets_created = self.counts.meets_created,
            gymnasts_created = self.counts.gymnasts_created,
            scores_inserted = self.counts.scores_inserted,
            scores_skipped = self.counts.scores_skipped,
            "loaded score rows"
        );
        Ok(self.counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gymdb_core::{MeetDay, SlotScore, SlotScores};

    fn aliases() -> BTreeMap<String, String> {
        BTreeMap::from([("Chinese Taipei".to_string(), "Taiwan".to_string())])
    }

    fn row(gymnast: &str, country: &str, day: MeetDay, vt1: f64) -> ScoreRow {
        ScoreRow {
            gymnast: gymnast.into(),
            country: Some(country.into()),
            meet_name: "Worlds (2017)".into(),
            meet_day: day,
            junior: false,
            scores: SlotScores {
                vt1: SlotScore::new(Some(vt1), Some(5.4)),
                vt2: SlotScore::new(Some(14.0), None),
                ub: SlotScore::new(None, Some(5.9)),
                ..SlotScores::default()
            },
            start_date: None,
            end_date: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn seeding_creates_eight_events_once() {
        let db = GymDb::in_memory().await.unwrap();
        seed_events(&db).await.unwrap();
        let events = seed_events(&db).await.unwrap();
        assert_eq!(events.len(), 8);
        assert_eq!(db.counts().await.unwrap().events, 8);
    }

    #[tokio::test]
    async fn taiwan_aliases_share_one_country() {
        let db = GymDb::in_memory().await.unwrap();
        let rules = RuleSet::from_pairs(&[("Chia", "China")]);
        let aliases = aliases();
        let mut resolver = Resolver::new(&db, &rules, &aliases).await.unwrap();

        let a = resolver.ensure_country("Chinese Taipei").await.unwrap();
        let b = resolver.ensure_country("Taiwan").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.iso3c.as_deref(), Some("TWN"));

        let china = resolver.ensure_country("Chia").await.unwrap();
        assert_eq!(china.name, "China");
        let unknown = resolver.ensure_country("Atlantis").await.unwrap();
        assert_eq!(unknown.iso3c, None);

        assert_eq!(resolver.counts().countries_created, 3);
        assert_eq!(db.counts().await.unwrap().countries, 3);
    }

    #[tokio::test]
    async fn loading_twice_inserts_nothing_new() {
        let db = GymDb::in_memory().await.unwrap();
        let rules = RuleSet::default();
        let aliases = aliases();
        let rows = vec![
            row("Simone Biles", "USA", MeetDay::Qualifying, 15.0),
            row("Simone Biles", "USA", MeetDay::AllAroundFinal, 15.1),
        ];

        let mut first = Resolver::new(&db, &rules, &aliases).await.unwrap();
        let counts = first.load_rows(&rows).await.unwrap();
        assert_eq!(counts.scores_inserted, 4);
        assert_eq!(counts.meets_created, 1);
        assert_eq!(counts.gymnasts_created, 1);
        let before = db.counts().await.unwrap();

        let mut second = Resolver::new(&db, &rules, &aliases).await.unwrap();
        let counts = second.load_rows(&rows).await.unwrap();
        assert_eq!(counts.scores_inserted, 0);
        assert_eq!(counts.scores_skipped, 4);
        assert_eq!(counts.gymnasts_created, 0);
        assert_eq!(db.counts().await.unwrap(), before);
    }

    #[tokio::test]
    async fn vault_slots_are_stored_as_distinct_score_numbers() {
        let db = GymDb::in_memory().await.unwrap();
        let rules = RuleSet::default();
        let aliases = aliases();
        let mut resolver = Resolver::new(&db, &rules, &aliases).await.unwrap();
        resolver
            .load_row(&row("Maria Paseka", "Russia", MeetDay::EventFinals, 14.5))
            .await
            .unwrap();

        let gymnast = db.find_gymnast("Maria Paseka").await.unwrap().unwrap();
        let scores = db.scores_for_gymnast(gymnast.id).await.unwrap();
        let nums: Vec<_> = scores.iter().map(|s| s.key.score_num).collect();
        assert_eq!(nums, vec![1, 2]);
        assert!(scores.iter().all(|s| s.key.meet_day == MeetDay::EventFinals));
        assert_eq!(scores[0].d_score, Some(5.4));
        assert_eq!(scores[1].d_score, None);
    }
}
