//! Core domain model for the gymnastics score database.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "gymdb-core";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} code: {code:?}")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: String,
}

/// One of the four women's apparatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Apparatus {
    #[serde(rename = "VT")]
    Vault,
    #[serde(rename = "UB")]
    UnevenBars,
    #[serde(rename = "BB")]
    BalanceBeam,
    #[serde(rename = "FX")]
    Floor,
}

impl Apparatus {
    pub const ALL: [Apparatus; 4] = [
        Apparatus::Vault,
        Apparatus::UnevenBars,
        Apparatus::BalanceBeam,
        Apparatus::Floor,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Apparatus::Vault => "VT",
            Apparatus::UnevenBars => "UB",
            Apparatus::BalanceBeam => "BB",
            Apparatus::Floor => "FX",
        }
    }
}

impl fmt::Display for Apparatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Apparatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Apparatus::ALL
            .into_iter()
            .find(|a| a.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCode {
                kind: "apparatus",
                code: s.to_string(),
            })
    }
}

/// Session of a meet a score was earned in. `Unspecified` covers single-session meets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum MeetDay {
    #[default]
    #[serde(rename = "")]
    Unspecified,
    #[serde(rename = "QF")]
    Qualifying,
    #[serde(rename = "TF")]
    TeamFinal,
    #[serde(rename = "AA")]
    AllAroundFinal,
    #[serde(rename = "EF")]
    EventFinals,
}

impl MeetDay {
    /// Order in which day tokens are tested against a raw meet name.
    pub const CLASSIFY_ORDER: [MeetDay; 4] = [
        MeetDay::Qualifying,
        MeetDay::TeamFinal,
        MeetDay::AllAroundFinal,
        MeetDay::EventFinals,
    ];

    pub fn code(self) -> &'static str {
        match self {
            MeetDay::Unspecified => "",
            MeetDay::Qualifying => "QF",
            MeetDay::TeamFinal => "TF",
            MeetDay::AllAroundFinal => "AA",
            MeetDay::EventFinals => "EF",
        }
    }
}

impl fmt::Display for MeetDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MeetDay {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(MeetDay::Unspecified);
        }
        MeetDay::CLASSIFY_ORDER
            .into_iter()
            .find(|d| d.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCode {
                kind: "meet day",
                code: s.to_string(),
            })
    }
}

/// The five score columns a gymnast can post in one meet session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreSlot {
    Vt1,
    Vt2,
    Ub,
    Bb,
    Fx,
}

impl ScoreSlot {
    pub const ALL: [ScoreSlot; 5] = [
        ScoreSlot::Vt1,
        ScoreSlot::Ub,
        ScoreSlot::Bb,
        ScoreSlot::Fx,
        ScoreSlot::Vt2,
    ];

    pub fn apparatus(self) -> Apparatus {
        match self {
            ScoreSlot::Vt1 | ScoreSlot::Vt2 => Apparatus::Vault,
            ScoreSlot::Ub => Apparatus::UnevenBars,
            ScoreSlot::Bb => Apparatus::BalanceBeam,
            ScoreSlot::Fx => Apparatus::Floor,
        }
    }

    /// Distinguishes first and second vaults within the same event.
    pub fn score_num(self) -> i64 {
        match self {
            ScoreSlot::Vt2 => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotScore {
    pub score: Option<f64>,
    pub d_score: Option<f64>,
}

impl SlotScore {
    pub fn new(score: Option<f64>, d_score: Option<f64>) -> Self {
        Self { score, d_score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotScores {
    pub vt1: SlotScore,
    pub vt2: SlotScore,
    pub ub: SlotScore,
    pub bb: SlotScore,
    pub fx: SlotScore,
}

impl SlotScores {
    pub fn get(&self, slot: ScoreSlot) -> SlotScore {
        match slot {
            ScoreSlot::Vt1 => self.vt1,
            ScoreSlot::Vt2 => self.vt2,
            ScoreSlot::Ub => self.ub,
            ScoreSlot::Bb => self.bb,
            ScoreSlot::Fx => self.fx,
        }
    }

    pub fn get_mut(&mut self, slot: ScoreSlot) -> &mut SlotScore {
        match slot {
            ScoreSlot::Vt1 => &mut self.vt1,
            ScoreSlot::Vt2 => &mut self.vt2,
            ScoreSlot::Ub => &mut self.ub,
            ScoreSlot::Bb => &mut self.bb,
            ScoreSlot::Fx => &mut self.fx,
        }
    }

    /// Slots that carry a total score, in load order.
    pub fn present(&self) -> impl Iterator<Item = (ScoreSlot, SlotScore)> + '_ {
        ScoreSlot::ALL
            .into_iter()
            .map(|slot| (slot, self.get(slot)))
            .filter(|(_, s)| s.score.is_some())
    }
}

/// A meet parsed from the season calendar page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub meet_name: String,
    pub start_label: String,
    pub end_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub location: String,
}

/// Canonical row produced by the score table builder: one per (gymnast, meet, meet day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub gymnast: String,
    pub country: Option<String>,
    pub meet_name: String,
    pub meet_day: MeetDay,
    pub junior: bool,
    pub scores: SlotScores,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub iso3c: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meet {
    pub id: i64,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub apparatus: Apparatus,
    pub junior: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gymnast {
    pub id: i64,
    pub name: String,
    pub country_id: Option<i64>,
}

/// Natural identity of a stored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreKey {
    pub gymnast_id: i64,
    pub meet_id: i64,
    pub meet_day: MeetDay,
    pub event_id: i64,
    pub score_num: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: i64,
    pub key: ScoreKey,
    pub score: Option<f64>,
    pub d_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    JoinMismatch,
    MalformedInput,
    LookupMiss,
}

/// A non-fatal problem surfaced in the per-run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub source: String,
    pub row: Option<usize>,
    pub detail: String,
}

impl Issue {
    pub fn new(kind: IssueKind, source: impl Into<String>, row: Option<usize>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            row,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_day_codes_round_trip_through_from_str() {
        for day in MeetDay::CLASSIFY_ORDER {
            assert_eq!(day.code().parse::<MeetDay>().unwrap(), day);
        }
        assert_eq!("".parse::<MeetDay>().unwrap(), MeetDay::Unspecified);
        assert_eq!(" ef ".parse::<MeetDay>().unwrap(), MeetDay::EventFinals);
        assert!("SF".parse::<MeetDay>().is_err());
    }

    #[test]
    fn vault_slots_share_apparatus_but_not_score_num() {
        assert_eq!(ScoreSlot::Vt1.apparatus(), ScoreSlot::Vt2.apparatus());
        assert_eq!(ScoreSlot::Vt1.score_num(), 1);
        assert_eq!(ScoreSlot::Vt2.score_num(), 2);
        assert_eq!(ScoreSlot::Fx.score_num(), 1);
    }

    #[test]
    fn present_skips_slots_without_total() {
        let mut scores = SlotScores::default();
        scores.ub = SlotScore::new(Some(13.9), Some(5.4));
        scores.vt2 = SlotScore::new(None, Some(5.0));
        let present: Vec<_> = scores.present().map(|(slot, _)| slot).collect();
        assert_eq!(present, vec![ScoreSlot::Ub]);
    }

    #[test]
    fn meet_day_serializes_as_code() {
        let json = serde_json::to_string(&MeetDay::TeamFinal).unwrap();
        assert_eq!(json, "\"TF\"");
        let json = serde_json::to_string(&MeetDay::Unspecified).unwrap();
        assert_eq!(json, "\"\"");
    }
}
