// src/pipeline/mod.rs
//! The population pipeline: roster ingestion, lookup-table rebuild and
//! alumni/course association, run as one synchronous batch.

pub mod associate;
pub mod ingest;
pub mod lookup;

pub use ingest::{IngestionMode, IngestionOutcome};

use crate::config::AppConfig;
use crate::enrichment::ProfileFetcher;
use crate::geocode::CoordinateLookup;
use crate::sheet::RosterSheet;
use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::info;

/// Decode a roster LinkedIn cell into the canonical link used as the key
/// everywhere (percent-decoded, trimmed).
pub(crate) fn decode_link(raw: &str) -> String {
    percent_decode_str(raw.trim())
        .decode_utf8_lossy()
        .to_string()
}

/// Counts and accumulated diagnostics of one full population run.
#[derive(Debug, Default)]
pub struct PopulationReport {
    pub stored: usize,
    pub row_errors: Vec<String>,
    pub api_errors: Vec<String>,
    pub courses: i64,
    pub cities: i64,
    pub countries: i64,
    pub normalized: usize,
    pub course_links: usize,
}

impl PopulationReport {
    pub fn has_errors(&self) -> bool {
        !self.row_errors.is_empty() || !self.api_errors.is_empty()
    }
}

/// Run the whole pipeline in dependency order: alumni first, then the lookup
/// tables the normalized rows reference, then the normalized rows and their
/// course links. Saves are individual statements; a run that fails partway
/// leaves the tables partially populated and the report says what succeeded.
pub async fn run_population<F, G>(
    pool: &SqlitePool,
    sheet: &RosterSheet,
    config: &AppConfig,
    fetcher: &F,
    geocoder: &G,
    mode: IngestionMode,
) -> Result<PopulationReport>
where
    F: ProfileFetcher,
    G: CoordinateLookup,
{
    info!("Starting population run in {} mode", mode.as_str());

    let outcome = ingest::ingest_roster(
        pool,
        sheet,
        &config.roster,
        fetcher,
        &config.encrypted_api_key,
        &config.pictures_dir,
        mode,
    )
    .await?;

    let courses = lookup::populate_courses(pool, sheet, &config.roster).await?;
    let cities = lookup::rebuild_cities(pool, geocoder).await?;
    let countries = lookup::rebuild_countries(pool, geocoder).await?;
    let normalized = associate::rebuild_normalized(pool).await?;
    let course_links = associate::link_courses(pool, sheet, &config.roster).await?;

    let report = PopulationReport {
        stored: outcome.stored,
        row_errors: outcome.row_errors,
        api_errors: outcome.api_errors,
        courses,
        cities,
        countries,
        normalized,
        course_links,
    };

    info!(
        "Population finished: {} stored, {} courses, {} cities, {} countries, {} normalized, {} links, {} row errors, {} API errors",
        report.stored,
        report.courses,
        report.cities,
        report.countries,
        report.normalized,
        report.course_links,
        report.row_errors.len(),
        report.api_errors.len()
    );

    Ok(report)
}

/// Merge the two error lists into a plain-text report. Nothing is written
/// when the run was clean; the previous report is removed so a stale one is
/// never served.
pub fn write_error_report(path: &Path, report: &PopulationReport) -> Result<Option<PathBuf>> {
    if !report.has_errors() {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale report: {}", path.display()))?;
        }
        return Ok(None);
    }

    let mut content = String::new();

    if !report.row_errors.is_empty() {
        content.push_str("Spreadsheet errors:\n");
        for error in &report.row_errors {
            content.push_str(error);
            content.push('\n');
        }
    }

    if !report.api_errors.is_empty() {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str("API errors:\n");
        for error in &report.api_errors {
            content.push_str(error);
            content.push('\n');
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;

    Ok(Some(path.to_path_buf()))
}
