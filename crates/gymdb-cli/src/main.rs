use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gymdb_storage::GymDb;
use gymdb_sync::{
    clean_duplicates, list_seasons, load_season, merge, run_season, source_for, suggest_merges,
    AppConfig, MergeOutcome, MergeRules, DEFAULT_SUGGESTION_THRESHOLD,
};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "gymdb")]
#[command(about = "Gymnastics score database loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply schema migrations.
    Migrate,
    /// Load one season, or every configured season.
    Ingest {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        season: Option<i32>,
        #[arg(long)]
        all: bool,
        /// Read each source's local fixture instead of fetching it.
        #[arg(long)]
        offline: bool,
    },
    /// Fold one gymnast's scores into another and delete the duplicate.
    Merge { duplicate: String, canonical: String },
    /// Apply the substring rules and explicit pairs from a merge rules file.
    CleanDuplicates {
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Print likely duplicate gymnasts for review.
    SuggestMerges {
        #[arg(long, default_value_t = DEFAULT_SUGGESTION_THRESHOLD)]
        threshold: f64,
    },
    /// Print row counts per table.
    Stats,
}

async fn open_db(config: &AppConfig) -> Result<GymDb> {
    let db = GymDb::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    db.migrate().await.context("applying migrations")?;
    Ok(db)
}

async fn ingest(config: &AppConfig, years: Vec<i32>, offline: bool) -> Result<()> {
    let db = open_db(config).await?;

    for year in years {
        let season = load_season(&config.seasons_dir(), year)?;
        let run_id = Uuid::new_v4();
        let source = source_for(config, run_id, offline)?;
        let report = run_season(&db, source.as_ref(), &season, run_id, offline)
            .await
            .with_context(|| format!("ingesting season {year}"))?;
        let path = report.write(&config.reports_dir).await?;
        println!(
            "season {year}: rows={} scores_inserted={} scores_skipped={} issues={} report={}",
            report.counts.rows_built,
            report.counts.load.scores_inserted,
            report.counts.load.scores_skipped,
            report.issues.len(),
            path.display()
        );
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env();

    match cli.command {
        Commands::Migrate => {
            open_db(&config).await?;
            info!(database = %config.database_url, "migrations applied");
        }
        Commands::Ingest {
            season,
            all,
            offline,
        } => {
            let years = if all {
                list_seasons(&config.seasons_dir())?
            } else {
                season.into_iter().collect()
            };
            ingest(&config, years, offline).await?;
        }
        Commands::Merge {
            duplicate,
            canonical,
        } => {
            let db = open_db(&config).await?;
            match merge(&db, &duplicate, &canonical).await? {
                MergeOutcome::Merged { moved, dropped } => {
                    println!("merged {duplicate} into {canonical}: moved={moved} dropped={dropped}")
                }
                other => println!("nothing merged: {other:?}"),
            }
        }
        Commands::CleanDuplicates { rules } => {
            let path = rules.unwrap_or_else(|| config.merges_path());
            let rules = MergeRules::load(&path)?;
            let db = open_db(&config).await?;
            let summary = clean_duplicates(&db, &rules).await?;
            println!(
                "merged={} skipped={} scores_moved={} scores_dropped={}",
                summary.merged, summary.skipped, summary.scores_moved, summary.scores_dropped
            );
        }
        Commands::SuggestMerges { threshold } => {
            let db = open_db(&config).await?;
            for suggestion in suggest_merges(&db, threshold).await? {
                println!(
                    "{:.3}\t{}\t{}",
                    suggestion.similarity, suggestion.first, suggestion.second
                );
            }
        }
        Commands::Stats => {
            let db = open_db(&config).await?;
            let counts = db.counts().await?;
            println!(
                "countries={} meets={} events={} gymnasts={} scores={}",
                counts.countries, counts.meets, counts.events, counts.gymnasts, counts.scores
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err:#}");
        return Err(err);
    }
    Ok(())
}
