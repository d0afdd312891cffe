//! SQLite-backed keyed store for countries, meets, events, gymnasts and scores.
//!
//! Every write is independently idempotent: natural keys carry UNIQUE
//! constraints and inserts use `ON CONFLICT DO NOTHING`, so an aborted run can
//! simply be re-run.

use std::str::FromStr;

use chrono::NaiveDate;
use gymdb_core::{Apparatus, Country, Event, Gymnast, Meet, MeetDay, Score, ScoreKey};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("column {column} holds undecodable value {value:?}")]
    Decode { column: &'static str, value: String },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub countries: i64,
    pub meets: i64,
    pub events: i64,
    pub gymnasts: i64,
    pub scores: i64,
}

/// Outcome of folding one gymnast's scores into another inside a single transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub moved: u64,
    /// Duplicate scores dropped because the canonical gymnast already had that key.
    pub dropped: u64,
}

#[derive(Debug, Clone)]
pub struct GymDb {
    pool: SqlitePool,
}

impl GymDb {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database with migrations applied.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn counts(&self) -> Result<TableCounts> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM countries) AS countries,
                (SELECT COUNT(*) FROM meets) AS meets,
                (SELECT COUNT(*) FROM events) AS events,
                (SELECT COUNT(*) FROM gymnasts) AS gymnasts,
                (SELECT COUNT(*) FROM scores) AS scores",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(TableCounts {
            countries: row.get("countries"),
            meets: row.get("meets"),
            events: row.get("events"),
            gymnasts: row.get("gymnasts"),
            scores: row.get("scores"),
        })
    }

    // ── Countries ───────────────────────────────────────────────────────

    pub async fn find_country(&self, name: &str) -> Result<Option<Country>> {
        let row = sqlx::query("SELECT id, name, iso3c FROM countries WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(country_from_row))
    }

    /// Insert unless a country with this name exists; returns the stored row either way.
    pub async fn create_country(&self, name: &str, iso3c: Option<&str>) -> Result<Country> {
        sqlx::query("INSERT INTO countries (name, iso3c) VALUES (?1, ?2) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .bind(iso3c)
            .execute(&self.pool)
            .await?;
        debug!(country = name, ?iso3c, "country stored");
        self.find_country(name)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    // ── Meets ───────────────────────────────────────────────────────────

    pub async fn find_meet(&self, name: &str) -> Result<Option<Meet>> {
        let row = sqlx::query("SELECT id, name, start_date, end_date FROM meets WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(meet_from_row))
    }

    pub async fn create_meet(
        &self,
        name: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Meet> {
        sqlx::query(
            "INSERT INTO meets (name, start_date, end_date) VALUES (?1, ?2, ?3)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(start_date)
        .bind(end_date)
        .execute(&self.pool)
        .await?;
        debug!(meet = name, ?start_date, ?end_date, "meet stored");
        self.find_meet(name)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    pub async fn update_meet_dates(
        &self,
        id: i64,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<()> {
        sqlx::query("UPDATE meets SET start_date = ?1, end_date = ?2 WHERE id = ?3")
            .bind(start_date)
            .bind(end_date)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub async fn find_event(&self, apparatus: Apparatus, junior: bool) -> Result<Option<Event>> {
        let row = sqlx::query("SELECT id, name, junior FROM events WHERE name = ?1 AND junior = ?2")
            .bind(apparatus.code())
            .bind(junior)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    pub async fn create_event(&self, apparatus: Apparatus, junior: bool) -> Result<Event> {
        sqlx::query("INSERT INTO events (name, junior) VALUES (?1, ?2) ON CONFLICT (name, junior) DO NOTHING")
            .bind(apparatus.code())
            .bind(junior)
            .execute(&self.pool)
            .await?;
        self.find_event(apparatus, junior)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    pub async fn list_events(&self) -> Result<Vec<Event>> {
        let rows = sqlx::query("SELECT id, name, junior FROM events ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(event_from_row).collect()
    }

    // ── Gymnasts ────────────────────────────────────────────────────────

    pub async fn find_gymnast(&self, name: &str) -> Result<Option<Gymnast>> {
        let row = sqlx::query("SELECT id, name, country_id FROM gymnasts WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(gymnast_from_row))
    }

    pub async fn create_gymnast(&self, name: &str, country_id: Option<i64>) -> Result<Gymnast> {
        sqlx::query("INSERT INTO gymnasts (name, country_id) VALUES (?1, ?2) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .bind(country_id)
            .execute(&self.pool)
            .await?;
        debug!(gymnast = name, ?country_id, "gymnast stored");
        self.find_gymnast(name)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    /// Case-sensitive substring search over gymnast names.
    pub async fn find_gymnasts_containing(&self, fragment: &str) -> Result<Vec<Gymnast>> {
        let rows = sqlx::query(
            "SELECT id, name, country_id FROM gymnasts WHERE instr(name, ?1) > 0 ORDER BY name",
        )
        .bind(fragment)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(gymnast_from_row).collect())
    }

    pub async fn list_gymnasts(&self) -> Result<Vec<Gymnast>> {
        let rows = sqlx::query("SELECT id, name, country_id FROM gymnasts ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(gymnast_from_row).collect())
    }

    // ── Scores ──────────────────────────────────────────────────────────

    pub async fn find_score(&self, key: &ScoreKey) -> Result<Option<Score>> {
        let row = sqlx::query(
            "SELECT id, gymnast_id, meet_id, meet_day, event_id, score_num, score, d_score
             FROM scores
             WHERE gymnast_id = ?1 AND meet_id = ?2 AND meet_day = ?3 AND event_id = ?4 AND score_num = ?5",
        )
        .bind(key.gymnast_id)
        .bind(key.meet_id)
        .bind(key.meet_day.code())
        .bind(key.event_id)
        .bind(key.score_num)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(score_from_row).transpose()
    }

    /// Insert a score unless its full key is already present. Returns whether a row was written.
    ///
    /// An existing row is never overwritten, even when the values differ.
    pub async fn insert_score_if_absent(
        &self,
        key: &ScoreKey,
        score: Option<f64>,
        d_score: Option<f64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO scores (gymnast_id, meet_id, meet_day, event_id, score_num, score, d_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (gymnast_id, meet_id, meet_day, event_id, score_num) DO NOTHING",
        )
        .bind(key.gymnast_id)
        .bind(key.meet_id)
        .bind(key.meet_day.code())
        .bind(key.event_id)
        .bind(key.score_num)
        .bind(score)
        .bind(d_score)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn scores_for_gymnast(&self, gymnast_id: i64) -> Result<Vec<Score>> {
        let rows = sqlx::query(
            "SELECT id, gymnast_id, meet_id, meet_day, event_id, score_num, score, d_score
             FROM scores WHERE gymnast_id = ?1 ORDER BY id",
        )
        .bind(gymnast_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(score_from_row).collect()
    }

    /// Reassign every score of `duplicate_id` to `canonical_id` and delete the duplicate.
    ///
    /// Runs in one transaction so no score ever references a deleted gymnast.
    /// The canonical gymnast inherits the duplicate's country when it has none.
    pub async fn merge_gymnasts(&self, duplicate_id: i64, canonical_id: i64) -> Result<MergeCounts> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query("UPDATE OR IGNORE scores SET gymnast_id = ?1 WHERE gymnast_id = ?2")
            .bind(canonical_id)
            .bind(duplicate_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let dropped = sqlx::query("DELETE FROM scores WHERE gymnast_id = ?1")
            .bind(duplicate_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "UPDATE gymnasts
             SET country_id = (SELECT country_id FROM gymnasts WHERE id = ?1)
             WHERE id = ?2 AND country_id IS NULL",
        )
        .bind(duplicate_id)
        .bind(canonical_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM gymnasts WHERE id = ?1")
            .bind(duplicate_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(MergeCounts { moved, dropped })
    }
}

fn country_from_row(row: &SqliteRow) -> Country {
    Country {
        id: row.get("id"),
        name: row.get("name"),
        iso3c: row.get("iso3c"),
    }
}

fn meet_from_row(row: &SqliteRow) -> Meet {
    Meet {
        id: row.get("id"),
        name: row.get("name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
    }
}

fn gymnast_from_row(row: &SqliteRow) -> Gymnast {
    Gymnast {
        id: row.get("id"),
        name: row.get("name"),
        country_id: row.get("country_id"),
    }
}

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    let name: String = row.get("name");
    let apparatus = name.parse::<Apparatus>().map_err(|_| StoreError::Decode {
        column: "events.name",
        value: name.clone(),
    })?;
    Ok(Event {
        id: row.get("id"),
        apparatus,
        junior: row.get("junior"),
    })
}

fn score_from_row(row: &SqliteRow) -> Result<Score> {
    let meet_day: String = row.get("meet_day");
    let meet_day = meet_day.parse::<MeetDay>().map_err(|_| StoreError::Decode {
        column: "scores.meet_day",
        value: meet_day.clone(),
    })?;
    Ok(Score {
        id: row.get("id"),
        key: ScoreKey {
            gymnast_id: row.get("gymnast_id"),
            meet_id: row.get("meet_id"),
            meet_day,
            event_id: row.get("event_id"),
            score_num: row.get("score_num"),
        },
        score: row.get("score"),
        d_score: row.get("d_score"),
    })
}
