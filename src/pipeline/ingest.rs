// src/pipeline/ingest.rs
//! Row-by-row roster ingestion with per-row error isolation: one malformed
//! row or failed lookup never aborts the batch.

use crate::config::RosterLayout;
use crate::database::AlumnusRepository;
use crate::enrichment::{format_api_error, EnrichmentError, ProfileFetcher};
use crate::extract;
use crate::sheet::RosterSheet;
use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionMode {
    /// New links only; rows whose link is already stored are skipped without
    /// calling the enrichment API.
    Add,
    /// Every non-blank row is enriched; existing rows get their stored
    /// profile document overwritten in place.
    Update,
}

impl IngestionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(Self::Add),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
        }
    }
}

/// Accumulated results of one ingestion pass. Structural roster errors and
/// enrichment failures are tracked separately for the report.
#[derive(Debug, Default)]
pub struct IngestionOutcome {
    pub row_errors: Vec<String>,
    pub api_errors: Vec<String>,
    pub stored: usize,
}

enum RowOutcome {
    Skipped,
    Stored,
    ApiFailure,
}

enum RowFailure {
    /// Recorded in the row error list; the batch continues.
    Row(String),
    /// Corrupts every later row (shared key, broken database); aborts the run.
    Fatal(anyhow::Error),
}

pub async fn ingest_roster<F: ProfileFetcher>(
    pool: &SqlitePool,
    sheet: &RosterSheet,
    layout: &RosterLayout,
    fetcher: &F,
    encrypted_api_key: &str,
    pictures_dir: &Path,
    mode: IngestionMode,
) -> Result<IngestionOutcome> {
    let mut outcome = IngestionOutcome::default();

    for row in layout.header_rows..sheet.row_count() {
        let result = process_row(
            pool,
            sheet,
            layout,
            fetcher,
            encrypted_api_key,
            pictures_dir,
            mode,
            row,
            &mut outcome.api_errors,
        )
        .await;

        match result {
            Ok(RowOutcome::Stored) => outcome.stored += 1,
            Ok(RowOutcome::Skipped) | Ok(RowOutcome::ApiFailure) => {}
            Err(RowFailure::Row(message)) => {
                warn!("{}", message);
                outcome.row_errors.push(message);
            }
            Err(RowFailure::Fatal(error)) => return Err(error),
        }
    }

    info!(
        "Ingestion done: {} stored, {} row errors, {} API errors",
        outcome.stored,
        outcome.row_errors.len(),
        outcome.api_errors.len()
    );

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
async fn process_row<F: ProfileFetcher>(
    pool: &SqlitePool,
    sheet: &RosterSheet,
    layout: &RosterLayout,
    fetcher: &F,
    encrypted_api_key: &str,
    pictures_dir: &Path,
    mode: IngestionMode,
    row: usize,
    api_errors: &mut Vec<String>,
) -> Result<RowOutcome, RowFailure> {
    let raw_link = sheet
        .cell_text(row, layout.linkedin_column)
        .map_err(|e| RowFailure::Row(format!("Row {}: {}", row + 1, e)))?;

    let link = super::decode_link(&raw_link);
    if link.is_empty() {
        return Ok(RowOutcome::Skipped);
    }

    let repo = AlumnusRepository::new(pool);
    let exists = repo
        .exists_by_link(&link)
        .await
        .map_err(RowFailure::Fatal)?;

    if mode == IngestionMode::Add && exists {
        info!("Skipping already stored profile: {}", link);
        return Ok(RowOutcome::Skipped);
    }

    let response = match fetcher.fetch(&link, encrypted_api_key).await {
        Ok(response) => response,
        Err(EnrichmentError::Decryption(e)) => {
            return Err(RowFailure::Fatal(
                anyhow::Error::new(e).context("Cannot decrypt enrichment API key"),
            ));
        }
        Err(EnrichmentError::Transport(e)) => {
            return Err(RowFailure::Row(format!(
                "Row {}: enrichment request for {} failed: {}",
                row + 1,
                link,
                e
            )));
        }
    };

    if !response.is_success() {
        api_errors.push(format_api_error(response.status, &response.body, &link));
        return Ok(RowOutcome::ApiFailure);
    }

    let profile: Value = serde_json::from_str(&response.body).map_err(|e| {
        RowFailure::Row(format!(
            "Row {}: malformed profile document for {}: {}",
            row + 1,
            link,
            e
        ))
    })?;

    let picture_url = extract::scalar(&profile, "profile_pic_url");
    let public_identifier = extract::scalar(&profile, "public_identifier");

    if !picture_url.is_empty() && !public_identifier.is_empty() {
        if let Err(e) = fetcher
            .download_picture(&picture_url, pictures_dir, &public_identifier)
            .await
        {
            api_errors.push(format!(
                "Failed to download picture for {}: {}",
                link, e
            ));
        }
    }

    if exists {
        repo.update_raw_json(&link, &response.body)
            .await
            .with_context(|| format!("Failed to overwrite profile for {}", link))
            .map_err(RowFailure::Fatal)?;
    } else {
        repo.save(&link, &response.body)
            .await
            .with_context(|| format!("Failed to store profile for {}", link))
            .map_err(RowFailure::Fatal)?;
    }

    Ok(RowOutcome::Stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::pipeline::testutil::{roster_bytes, StubFailure, StubFetcher};

    fn layout() -> RosterLayout {
        RosterLayout::default()
    }

    async fn run(
        pool: &SqlitePool,
        sheet: &RosterSheet,
        fetcher: &StubFetcher,
        mode: IngestionMode,
    ) -> IngestionOutcome {
        let dir = std::env::temp_dir();
        ingest_roster(pool, sheet, &layout(), fetcher, "key", &dir, mode)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_blank_link_rows_are_silently_skipped() {
        let pool = test_pool().await;
        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, ""),
            (2, 0, "   "),
        ]))
        .unwrap();
        let fetcher = StubFetcher::new(vec![]);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Add).await;

        assert_eq!(outcome.stored, 0);
        assert!(outcome.row_errors.is_empty());
        assert!(outcome.api_errors.is_empty());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_add_mode_skips_existing_without_api_call() {
        let pool = test_pool().await;
        AlumnusRepository::new(&pool)
            .save("https://linkedin.com/in/ada", "{}")
            .await
            .unwrap();

        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, "https://linkedin.com/in/ada"),
        ]))
        .unwrap();
        let fetcher = StubFetcher::new(vec![]);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Add).await;

        assert_eq!(outcome.stored, 0);
        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(AlumnusRepository::new(&pool).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_mode_overwrites_existing_profile() {
        let pool = test_pool().await;
        AlumnusRepository::new(&pool)
            .save("https://linkedin.com/in/ada", r#"{"city":"Porto"}"#)
            .await
            .unwrap();

        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, "https://linkedin.com/in/ada"),
        ]))
        .unwrap();
        let fetcher = StubFetcher::new(vec![(
            "https://linkedin.com/in/ada",
            200,
            r#"{"city":"Braga"}"#,
        )]);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Update).await;

        assert_eq!(outcome.stored, 1);
        assert_eq!(fetcher.call_count(), 1);

        let repo = AlumnusRepository::new(&pool);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(
            repo.find_all().await.unwrap()[0].raw_profile_json,
            r#"{"city":"Braga"}"#
        );
    }

    #[tokio::test]
    async fn test_failed_lookup_is_recorded_and_batch_continues() {
        let pool = test_pool().await;
        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, "https://linkedin.com/in/missing"),
            (2, 0, "https://linkedin.com/in/ada"),
        ]))
        .unwrap();
        let fetcher = StubFetcher::new(vec![
            (
                "https://linkedin.com/in/missing",
                404,
                r#"{"description":"Profile not found"}"#,
            ),
            ("https://linkedin.com/in/ada", 200, r#"{"full_name":"Ada"}"#),
        ]);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Add).await;

        assert_eq!(outcome.stored, 1);
        assert_eq!(outcome.api_errors.len(), 1);
        assert_eq!(
            outcome.api_errors[0],
            "API call failed with status code: 404 - Profile not found For profile: https://linkedin.com/in/missing"
        );
        assert!(outcome.row_errors.is_empty());
    }

    #[tokio::test]
    async fn test_decryption_failure_aborts_the_run() {
        let pool = test_pool().await;
        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, "https://linkedin.com/in/ada"),
            (2, 0, "https://linkedin.com/in/bob"),
        ]))
        .unwrap();
        // A broken key breaks every row, so the first hit ends the run.
        let fetcher = StubFetcher::new(vec![(
            "https://linkedin.com/in/bob",
            200,
            r#"{"full_name":"Bob"}"#,
        )])
        .with_failure("https://linkedin.com/in/ada", StubFailure::Decryption);

        let dir = std::env::temp_dir();
        let result = ingest_roster(
            &pool,
            &sheet,
            &layout(),
            &fetcher,
            "key",
            &dir,
            IngestionMode::Add,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(AlumnusRepository::new(&pool).count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_row_error_and_batch_continues() {
        let pool = test_pool().await;
        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, "https://linkedin.com/in/unreachable"),
            (2, 0, "https://linkedin.com/in/ada"),
        ]))
        .unwrap();
        let fetcher = StubFetcher::new(vec![(
            "https://linkedin.com/in/ada",
            200,
            r#"{"full_name":"Ada"}"#,
        )])
        .with_failure("https://linkedin.com/in/unreachable", StubFailure::Transport);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Add).await;

        assert_eq!(outcome.stored, 1);
        assert_eq!(outcome.row_errors.len(), 1);
        assert!(outcome.row_errors[0].contains("https://linkedin.com/in/unreachable"));
        assert!(outcome.api_errors.is_empty());
        assert!(AlumnusRepository::new(&pool)
            .exists_by_link("https://linkedin.com/in/ada")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_cell_is_a_row_error_and_batch_continues() {
        let pool = test_pool().await;

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "LinkedIn").unwrap();
        worksheet.write_number(1, 0, 12345.0).unwrap();
        worksheet
            .write_string(2, 0, "https://linkedin.com/in/ada")
            .unwrap();
        let sheet = RosterSheet::from_bytes(workbook.save_to_buffer().unwrap()).unwrap();

        let fetcher =
            StubFetcher::new(vec![("https://linkedin.com/in/ada", 200, r#"{"x":1}"#)]);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Add).await;

        assert_eq!(outcome.stored, 1);
        assert_eq!(outcome.row_errors.len(), 1);
        assert!(outcome.row_errors[0].contains("Row 2"));
    }

    #[tokio::test]
    async fn test_percent_encoded_links_are_decoded_before_lookup() {
        let pool = test_pool().await;
        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 0, "LinkedIn"),
            (1, 0, "https://linkedin.com/in/jo%C3%A3o"),
        ]))
        .unwrap();
        let fetcher = StubFetcher::new(vec![(
            "https://linkedin.com/in/joão",
            200,
            r#"{"full_name":"João"}"#,
        )]);

        let outcome = run(&pool, &sheet, &fetcher, IngestionMode::Add).await;

        assert_eq!(outcome.stored, 1);
        assert!(AlumnusRepository::new(&pool)
            .exists_by_link("https://linkedin.com/in/joão")
            .await
            .unwrap());
    }
}
