//! Score table builder: joins a season's sheets and calendar into canonical score rows.
//!
//! One output row per (gymnast, meet, meet day). Rows that cannot be joined
//! are reported as issues rather than failing the build.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use gymdb_adapters::{parse_sheet_date, Column, Table, TableRow};
use gymdb_core::{CalendarEntry, Issue, IssueKind, MeetDay, ScoreRow, SlotScore, SlotScores};
use tracing::{debug, info, warn};

use crate::config::SeasonConfig;

/// Parsed inputs of one season. `difficulty` is absent for single-sheet seasons.
#[derive(Debug, Clone, Copy)]
pub struct SourceTables<'a> {
    pub totals: &'a Table,
    pub difficulty: Option<&'a Table>,
    pub calendar: Option<&'a [CalendarEntry]>,
}

#[derive(Debug, Default)]
pub struct BuiltTable {
    pub rows: Vec<ScoreRow>,
    pub issues: Vec<Issue>,
}

/// Find the first meet-day token in `raw` (checked in `MeetDay::CLASSIFY_ORDER`),
/// matching whole words only, and return it with the name the token was cut from.
pub fn classify_meet_day(raw: &str) -> (MeetDay, String) {
    for day in MeetDay::CLASSIFY_ORDER {
        if let Some(pos) = find_word(raw, day.code()) {
            let stripped = format!("{}{}", &raw[..pos], &raw[pos + day.code().len()..]);
            return (day, collapse_whitespace(&stripped));
        }
    }
    (MeetDay::Unspecified, collapse_whitespace(raw))
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_truthy(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Build canonical score rows for a season.
pub fn build_score_rows(season: &SeasonConfig, sources: SourceTables<'_>) -> BuiltTable {
    let mut builder = Builder {
        season,
        totals_label: season.source_label("totals"),
        difficulty_label: season.source_label("difficulty"),
        calendar_label: season.source_label("calendar"),
        issues: Vec::new(),
    };
    let rows = builder.build(sources);
    BuiltTable {
        rows,
        issues: builder.issues,
    }
}

type JoinKey = (String, String);

/// Both sheets are keyed the same way, whitespace runs collapsed.
fn join_key(gymnast: &str, meet: &str) -> JoinKey {
    (collapse_whitespace(gymnast), collapse_whitespace(meet))
}

struct Builder<'a> {
    season: &'a SeasonConfig,
    totals_label: String,
    difficulty_label: String,
    calendar_label: String,
    issues: Vec<Issue>,
}

impl Builder<'_> {
    fn build(&mut self, sources: SourceTables<'_>) -> Vec<ScoreRow> {
        let difficulty = sources
            .difficulty
            .map(|table| self.index_difficulty(table))
            .unwrap_or_default();
        let calendar: Option<HashMap<String, &CalendarEntry>> = sources.calendar.map(|entries| {
            let mut index = HashMap::new();
            for entry in entries {
                index
                    .entry(collapse_whitespace(&entry.meet_name))
                    .or_insert(entry);
            }
            index
        });

        let mut used: HashSet<JoinKey> = HashSet::new();
        let mut undated: BTreeSet<String> = BTreeSet::new();
        let mut matched_meets: HashSet<String> = HashSet::new();
        let mut totals_only = 0usize;
        let mut rows = Vec::with_capacity(sources.totals.rows.len());

        for row in &sources.totals.rows {
            let Some(gymnast_raw) = row.text(Column::Gymnast) else {
                self.malformed_totals(row, "missing gymnast name");
                continue;
            };
            let Some(meet_raw) = row.text(Column::MeetName) else {
                self.malformed_totals(row, "missing meet name");
                continue;
            };

            let key = join_key(gymnast_raw, meet_raw);
            let diff_row = difficulty.get(&key).copied();
            if diff_row.is_some() {
                used.insert(key);
            } else if sources.difficulty.is_some() {
                totals_only += 1;
            }

            let scores = self.scores(sources.totals, row, diff_row);
            let country = row
                .text(Column::Country)
                .or_else(|| diff_row.and_then(|d| d.text(Column::Country)))
                .map(str::to_string);

            let (meet_day, stripped) = self.meet_day(sources.totals, row, meet_raw);
            let clean_meet = collapse_whitespace(&self.season.meet_rules.normalize(&stripped));
            let (junior, gymnast) = self.junior(sources.totals, row, gymnast_raw);

            let (start_date, end_date, location) = if sources.totals.has(Column::StartDate) {
                let start = self.date(row, Column::StartDate);
                let end = self.date(row, Column::EndDate).or(start);
                (start, end, row.text(Column::Location).map(str::to_string))
            } else if let Some(calendar) = &calendar {
                match calendar.get(&clean_meet) {
                    Some(entry) => {
                        matched_meets.insert(clean_meet.clone());
                        (
                            Some(entry.start_date),
                            Some(entry.end_date),
                            Some(entry.location.clone()).filter(|l| !l.is_empty()),
                        )
                    }
                    None => {
                        undated.insert(clean_meet.clone());
                        (None, None, None)
                    }
                }
            } else {
                (None, None, row.text(Column::Location).map(str::to_string))
            };

            rows.push(ScoreRow {
                gymnast,
                country,
                meet_name: self.season.meet_identity(&clean_meet),
                meet_day,
                junior,
                scores,
                start_date,
                end_date,
                location,
            });
        }

        if let Some(table) = sources.difficulty {
            self.report_difficulty_only(table, &difficulty, &used);
        }
        for meet in undated {
            warn!(source = %self.calendar_label, meet = %meet, "meet has no calendar entry");
            self.issues.push(Issue::new(
                IssueKind::JoinMismatch,
                &self.calendar_label,
                None,
                format!("{meet}: no calendar entry, dates left empty"),
            ));
        }
        if let Some(calendar) = &calendar {
            let calendar_only = calendar
                .keys()
                .filter(|name| !matched_meets.contains(*name))
                .count();
            debug!(calendar_only, "dropped calendar meets without scores");
        }
        info!(
            year = self.season.year,
            rows = rows.len(),
            totals_only,
            issues = self.issues.len(),
            "built score table"
        );
        rows
    }

    fn index_difficulty<'t>(&mut self, table: &'t Table) -> HashMap<JoinKey, &'t TableRow> {
        let mut index: HashMap<JoinKey, &'t TableRow> = HashMap::new();
        for row in &table.rows {
            let (Some(gymnast), Some(meet)) = (row.text(Column::Gymnast), row.text(Column::MeetName))
            else {
                self.issues.push(Issue::new(
                    IssueKind::MalformedInput,
                    &self.difficulty_label,
                    Some(row.line),
                    "missing gymnast or meet name",
                ));
                continue;
            };
            let key = join_key(gymnast, &self.season.difficulty_meet_rules.normalize(meet));
            if index.contains_key(&key) {
                self.issues.push(Issue::new(
                    IssueKind::JoinMismatch,
                    &self.difficulty_label,
                    Some(row.line),
                    format!("{} at {}: duplicate difficulty row ignored", key.0, key.1),
                ));
                continue;
            }
            index.insert(key, row);
        }
        index
    }

    fn report_difficulty_only(
        &mut self,
        table: &Table,
        index: &HashMap<JoinKey, &TableRow>,
        used: &HashSet<JoinKey>,
    ) {
        let mut unmatched: Vec<(&JoinKey, &TableRow)> = index
            .iter()
            .filter(|(key, _)| !used.contains(*key))
            .map(|(key, row)| (key, *row))
            .collect();
        unmatched.sort_by_key(|(_, row)| row.line);
        for (key, row) in unmatched {
            warn!(
                source = %self.difficulty_label,
                gymnast = %key.0,
                meet = %key.1,
                "difficulty row has no total, dropping"
            );
            self.issues.push(Issue::new(
                IssueKind::JoinMismatch,
                &self.difficulty_label,
                Some(row.line),
                format!("{} at {}: difficulty without a total score", key.0, key.1),
            ));
        }
        debug!(difficulty_rows = table.rows.len(), "difficulty join done");
    }

    fn scores(&mut self, totals: &Table, row: &TableRow, diff: Option<&TableRow>) -> SlotScores {
        let vt1 = self.number(&self.totals_label.clone(), row, Column::Vt1);
        let vt1_d = self.d_score(row, diff, Column::Vt1D);

        let vt2 = if totals.has(Column::Vt2) {
            self.number(&self.totals_label.clone(), row, Column::Vt2)
        } else {
            let avg = self.number(&self.totals_label.clone(), row, Column::VtAvg);
            avg.zip(vt1).map(|(avg, vt1)| round3(2.0 * avg - vt1))
        };
        let vt2_d = match self.d_score(row, diff, Column::Vt2D) {
            Some(explicit) => Some(explicit),
            None => self
                .d_score(row, diff, Column::VtTotalD)
                .zip(vt1_d)
                .map(|(total, vt1_d)| round3(total - vt1_d)),
        };

        let label = self.totals_label.clone();
        SlotScores {
            vt1: SlotScore::new(vt1, vt1_d),
            vt2: SlotScore::new(vt2, vt2_d),
            ub: SlotScore::new(
                self.number(&label, row, Column::Ub),
                self.d_score(row, diff, Column::UbD),
            ),
            bb: SlotScore::new(
                self.number(&label, row, Column::Bb),
                self.d_score(row, diff, Column::BbD),
            ),
            fx: SlotScore::new(
                self.number(&label, row, Column::Fx),
                self.d_score(row, diff, Column::FxD),
            ),
        }
    }

    /// D-score from the difficulty sheet when there is one, else from the totals sheet.
    fn d_score(&mut self, row: &TableRow, diff: Option<&TableRow>, column: Column) -> Option<f64> {
        if let Some(diff) = diff {
            let label = self.difficulty_label.clone();
            if let Some(value) = self.number(&label, diff, column) {
                return Some(value);
            }
        }
        let label = self.totals_label.clone();
        self.number(&label, row, column)
    }

    fn number(&mut self, label: &str, row: &TableRow, column: Column) -> Option<f64> {
        match row.number(column) {
            Ok(value) => value,
            Err(detail) => {
                warn!(source = label, row = row.line, %detail, "unreadable score, storing null");
                self.issues.push(Issue::new(
                    IssueKind::MalformedInput,
                    label,
                    Some(row.line),
                    detail,
                ));
                None
            }
        }
    }

    fn meet_day(&mut self, totals: &Table, row: &TableRow, meet_raw: &str) -> (MeetDay, String) {
        if !totals.has(Column::MeetDay) {
            return classify_meet_day(meet_raw);
        }
        let day = match row.text(Column::MeetDay).map(str::parse::<MeetDay>) {
            None => MeetDay::Unspecified,
            Some(Ok(day)) => day,
            Some(Err(err)) => {
                self.malformed_totals(row, &err.to_string());
                MeetDay::Unspecified
            }
        };
        (day, collapse_whitespace(meet_raw))
    }

    fn junior(&self, totals: &Table, row: &TableRow, gymnast_raw: &str) -> (bool, String) {
        let marker = self.season.junior_marker.as_str();
        let (junior, name) = if totals.has(Column::Junior) {
            (
                row.text(Column::Junior).is_some_and(is_truthy),
                gymnast_raw.to_string(),
            )
        } else if !marker.is_empty() && gymnast_raw.contains(marker) {
            (true, gymnast_raw.replace(marker, ""))
        } else {
            (false, gymnast_raw.to_string())
        };
        (
            junior,
            collapse_whitespace(&self.season.gymnast_rules.normalize(&name)),
        )
    }

    fn date(&mut self, row: &TableRow, column: Column) -> Option<NaiveDate> {
        let cell = row.text(column)?;
        match parse_sheet_date(cell) {
            Ok(date) => Some(date),
            Err(detail) => {
                self.malformed_totals(row, &format!("{column}: {detail}"));
                None
            }
        }
    }

    fn malformed_totals(&mut self, row: &TableRow, detail: &str) {
        warn!(source = %self.totals_label, row = row.line, detail, "malformed row");
        self.issues.push(Issue::new(
            IssueKind::MalformedInput,
            &self.totals_label,
            Some(row.line),
            detail,
        ));
    }
}
