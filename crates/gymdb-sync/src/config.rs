//! Process configuration from the environment and per-season YAML files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use gymdb_adapters::{CalendarLayout, ColumnSpec, Rule, RuleSet, SourceSpec};
use gymdb_storage::{FetchConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub artifacts_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub workspace_root: PathBuf,
    pub reports_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("GYMDB_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://gymdb.sqlite?mode=rwc".to_string()),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            user_agent: std::env::var("GYMDB_USER_AGENT")
                .unwrap_or_else(|_| "gymdb-loader/0.1".to_string()),
            http_timeout_secs: std::env::var("GYMDB_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            http_max_retries: std::env::var("GYMDB_HTTP_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            reports_dir: std::env::var("GYMDB_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("reports")),
            workspace_root,
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            retry: RetryPolicy {
                max_retries: self.http_max_retries,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn seasons_dir(&self) -> PathBuf {
        self.workspace_root.join("config").join("seasons")
    }

    pub fn merges_path(&self) -> PathBuf {
        self.workspace_root.join("config").join("merges.yaml")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonSources {
    pub totals: SourceSpec,
    #[serde(default)]
    pub difficulty: Option<SourceSpec>,
    #[serde(default)]
    pub calendar: Option<SourceSpec>,
}

/// Manual date patch for a meet the calendar could not date. `meet` omits the year suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateCorrection {
    pub meet: String,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

/// Everything that differs between competition years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonConfig {
    pub year: i32,
    pub sources: SeasonSources,
    pub totals_columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub difficulty_columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub calendar: CalendarLayout,
    #[serde(default)]
    pub gymnast_rules: RuleSet,
    #[serde(default)]
    pub meet_rules: RuleSet,
    #[serde(default)]
    pub country_rules: RuleSet,
    #[serde(default)]
    pub difficulty_meet_rules: RuleSet,
    /// Marker embedded in junior gymnasts' names. Empty disables detection.
    #[serde(default = "default_junior_marker")]
    pub junior_marker: String,
    #[serde(default = "default_country_aliases")]
    pub country_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub date_corrections: Vec<DateCorrection>,
}

fn default_junior_marker() -> String {
    "*".to_string()
}

fn default_country_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("Chinese Taipei".to_string(), "Taiwan".to_string())])
}

impl SeasonConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing season config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Label used for logs, issues and snapshot paths, e.g. `2017-totals`.
    pub fn source_label(&self, source: &str) -> String {
        format!("{}-{source}", self.year)
    }

    /// Stored meet identity: the clean name suffixed with the season year.
    pub fn meet_identity(&self, clean_name: &str) -> String {
        format!("{clean_name} ({})", self.year)
    }
}

/// Load `<dir>/<year>.yaml`.
pub fn load_season(dir: &Path, year: i32) -> Result<SeasonConfig> {
    let config = SeasonConfig::load(&dir.join(format!("{year}.yaml")))?;
    anyhow::ensure!(
        config.year == year,
        "season file for {year} declares year {}",
        config.year
    );
    Ok(config)
}

/// Years with a season file in `dir`, ascending.
pub fn list_seasons(dir: &Path) -> Result<Vec<i32>> {
    let mut years = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        if let Some(year) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<i32>().ok())
        {
            years.push(year);
        }
    }
    years.sort_unstable();
    Ok(years)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePair {
    pub duplicate: String,
    pub canonical: String,
}

/// Contents of `config/merges.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRules {
    /// Names containing `find` are duplicates of the name with `find` replaced.
    #[serde(default)]
    pub substring_rules: Vec<Rule>,
    #[serde(default)]
    pub pairs: Vec<MergePair>,
}

impl MergeRules {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gymdb_adapters::{Column, LocationLayout};
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
year: 2018
sources:
  totals:
    url: https://example.invalid/totals.csv
    fixture: fixtures/2018/totals.csv
totals_columns:
  - field: gymnast
    header: Gymnast
  - field: meet_name
    header: Meet
  - field: vt1
"#;

    #[test]
    fn minimal_season_takes_defaults() {
        let season = SeasonConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(season.year, 2018);
        assert!(season.sources.difficulty.is_none());
        assert_eq!(season.totals_columns[2].field, Column::Vt1);
        assert!(season.totals_columns[2].header.is_none());
        assert_eq!(season.junior_marker, "*");
        assert_eq!(
            season.country_aliases.get("Chinese Taipei").map(String::as_str),
            Some("Taiwan")
        );
        assert_eq!(season.calendar, CalendarLayout::default());
        assert!(season.meet_rules.is_empty());
        assert_eq!(season.source_label("totals"), "2018-totals");
        assert_eq!(season.meet_identity("Euros"), "Euros (2018)");
    }

    #[test]
    fn calendar_layout_and_corrections_parse() {
        let text = format!(
            "{MINIMAL}calendar:\n  location:\n    kind: cell\n    index: 2\n  exclude_names: [\"Men's\"]\n\
             meet_rules:\n  - find: Champs\n    replace: Championships\n\
             date_corrections:\n  - meet: Brazilian Selection\n    start: 2018-07-22\n"
        );
        let season = SeasonConfig::from_yaml(&text).unwrap();
        assert_eq!(season.calendar.location, LocationLayout::Cell { index: 2 });
        assert_eq!(season.calendar.name_cell, 1);
        assert_eq!(season.meet_rules.normalize("Euro Champs"), "Euro Championships");
        assert_eq!(season.date_corrections[0].end, None);
    }

    #[test]
    fn seasons_are_listed_by_year() {
        let dir = tempdir().unwrap();
        for name in ["2019.yaml", "2017.yaml", "notes.txt", "draft.yaml"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(list_seasons(dir.path()).unwrap(), vec![2017, 2019]);
    }

    #[test]
    fn season_file_must_match_its_year() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("2019.yaml"), MINIMAL).unwrap();
        assert!(load_season(dir.path(), 2019).is_err());
        std::fs::write(dir.path().join("2018.yaml"), MINIMAL).unwrap();
        assert_eq!(load_season(dir.path(), 2018).unwrap().year, 2018);
    }

    #[test]
    fn shipped_rule_sets_are_idempotent() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/seasons");
        for year in list_seasons(&dir).unwrap() {
            let season = load_season(&dir, year).unwrap();
            for rules in [
                &season.gymnast_rules,
                &season.meet_rules,
                &season.country_rules,
                &season.difficulty_meet_rules,
            ] {
                let atoms: Vec<&str> = rules
                    .rules()
                    .iter()
                    .flat_map(|r| [r.find.as_str(), r.replace.as_str()])
                    .collect();
                let mut names: Vec<String> = atoms.iter().map(|a| a.to_string()).collect();
                for a in &atoms {
                    for b in &atoms {
                        names.push(format!("{a} {b}"));
                    }
                }
                for name in names {
                    let once = rules.normalize(&name);
                    assert_eq!(rules.normalize(&once), once, "{year}: {name:?}");
                }
            }
        }
    }

    #[test]
    fn merge_rules_parse_both_kinds() {
        let rules: MergeRules = serde_yaml::from_str(
            "substring_rules:\n  - find: \"iia \"\n    replace: \"ia \"\npairs:\n  - duplicate: A B\n    canonical: A C\n",
        )
        .unwrap();
        assert_eq!(rules.substring_rules[0].find, "iia ");
        assert_eq!(rules.pairs[0].canonical, "A C");
    }
}
