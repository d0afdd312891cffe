//! Season ingestion: configuration, score table building, entity resolution,
//! date corrections, duplicate merging and run reports.

pub mod builder;
pub mod config;
pub mod corrections;
pub mod countries;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod resolve;

pub use builder::{build_score_rows, classify_meet_day, BuiltTable, SourceTables};
pub use config::{
    list_seasons, load_season, AppConfig, DateCorrection, MergePair, MergeRules, SeasonConfig,
    SeasonSources,
};
pub use corrections::apply_date_corrections;
pub use merge::{
    clean_duplicates, merge, suggest_merges, CleanupSummary, MergeOutcome, MergeSuggestion,
    DEFAULT_SUGGESTION_THRESHOLD,
};
pub use pipeline::{run_season, source_for};
pub use report::{RunCounts, RunReport};
pub use resolve::{seed_events, LoadCounts, Resolver};

pub const CRATE_NAME: &str = "gymdb-sync";
