// src/pipeline/lookup.rs
//! Lookup-table population. Cities and countries are materialized views over
//! the stored profiles: every run truncates and reinserts, so row counts
//! always reflect the current alumni table.

use crate::config::RosterLayout;
use crate::database::{
    Alumnus, AlumnusRepository, CityRepository, CountryRepository, CourseRepository,
};
use crate::extract;
use crate::geocode::CoordinateLookup;
use crate::sheet::RosterSheet;
use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};

/// Insert every roster course abbreviation not already present. Matching is
/// case-sensitive and exact; this table is not truncated.
pub async fn populate_courses(
    pool: &SqlitePool,
    sheet: &RosterSheet,
    layout: &RosterLayout,
) -> Result<i64> {
    let repo = CourseRepository::new(pool);

    for row in layout.header_rows..sheet.row_count() {
        let cell = match sheet.cell_text(row, layout.courses_column) {
            Ok(cell) => cell,
            Err(e) => {
                warn!("Skipping course cell: {}", e);
                continue;
            }
        };

        for abbreviation in cell.split_whitespace() {
            if !repo.exists_by_abbreviation(abbreviation).await? {
                repo.save(abbreviation).await?;
            }
        }
    }

    repo.count().await
}

/// Distinct lowercased city names with their alumni counts.
fn count_cities(alumni: &[Alumnus]) -> HashMap<String, i64> {
    let mut counts = HashMap::new();

    for alumnus in alumni {
        let Ok(profile) = serde_json::from_str::<Value>(&alumnus.raw_profile_json) else {
            warn!("Unparseable profile for {}", alumnus.linkedin_link);
            continue;
        };
        let city = extract::scalar(&profile, "city").to_lowercase();
        if !city.is_empty() {
            *counts.entry(city).or_insert(0) += 1;
        }
    }

    counts
}

/// Distinct lowercased country names with counts, plus the ISO code seen for
/// each name (last one wins; they do not vary in practice).
fn count_countries(alumni: &[Alumnus]) -> (HashMap<String, i64>, HashMap<String, String>) {
    let mut counts = HashMap::new();
    let mut iso_codes = HashMap::new();

    for alumnus in alumni {
        let Ok(profile) = serde_json::from_str::<Value>(&alumnus.raw_profile_json) else {
            continue;
        };
        let name = extract::scalar(&profile, "country_full_name").to_lowercase();
        if name.is_empty() {
            continue;
        }
        *counts.entry(name.clone()).or_insert(0) += 1;

        let iso = extract::scalar(&profile, "country");
        if !iso.is_empty() {
            iso_codes.insert(name, iso);
        }
    }

    (counts, iso_codes)
}

/// Truncate and rebuild the cities table. A geocoding miss drops only that
/// city; it is absent from the table, never a pipeline failure.
pub async fn rebuild_cities<G: CoordinateLookup>(pool: &SqlitePool, geocoder: &G) -> Result<i64> {
    let alumni = AlumnusRepository::new(pool).find_all().await?;
    let counts = count_cities(&alumni);

    let repo = CityRepository::new(pool);
    repo.delete_all().await?;

    let mut names: Vec<&String> = counts.keys().collect();
    names.sort();

    for name in names {
        match geocoder.lookup(name).await {
            Ok(Some(geocode)) => {
                repo.save(name, &geocode, counts[name]).await?;
            }
            Ok(None) => warn!("No coordinates found for city '{}', skipping", name),
            Err(e) => warn!("Geocoding city '{}' failed: {}", name, e),
        }
    }

    let total = repo.count().await?;
    info!("Cities rebuilt: {} rows", total);
    Ok(total)
}

/// Truncate and rebuild the countries table; the ISO code is the geocoding
/// query when present.
pub async fn rebuild_countries<G: CoordinateLookup>(
    pool: &SqlitePool,
    geocoder: &G,
) -> Result<i64> {
    let alumni = AlumnusRepository::new(pool).find_all().await?;
    let (counts, iso_codes) = count_countries(&alumni);

    let repo = CountryRepository::new(pool);
    repo.delete_all().await?;

    let mut names: Vec<&String> = counts.keys().collect();
    names.sort();

    for name in names {
        let iso = iso_codes.get(name).cloned().unwrap_or_default();
        let query = if iso.is_empty() { name.as_str() } else { iso.as_str() };

        match geocoder.lookup(query).await {
            Ok(Some(geocode)) => {
                repo.save(name, &iso, &geocode, counts[name]).await?;
            }
            Ok(None) => warn!("No coordinates found for country '{}', skipping", name),
            Err(e) => warn!("Geocoding country '{}' failed: {}", name, e),
        }
    }

    let total = repo.count().await?;
    info!("Countries rebuilt: {} rows", total);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;
    use crate::pipeline::testutil::{roster_bytes, StubGeocoder};

    fn alumnus(link: &str, raw: &str) -> Alumnus {
        Alumnus {
            id: 0,
            linkedin_link: link.to_string(),
            raw_profile_json: raw.to_string(),
        }
    }

    #[test]
    fn test_city_counts_are_lowercased_and_accumulated() {
        let alumni = vec![
            alumnus("a", r#"{"city":"Porto"}"#),
            alumnus("b", r#"{"city":"porto"}"#),
            alumnus("c", r#"{"city":"Lisboa"}"#),
            alumnus("d", r#"{"city":""}"#),
            alumnus("e", "not json"),
        ];

        let counts = count_cities(&alumni);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["porto"], 2);
        assert_eq!(counts["lisboa"], 1);
    }

    #[test]
    fn test_country_counts_track_iso_codes() {
        let alumni = vec![
            alumnus("a", r#"{"country_full_name":"Portugal","country":"PT"}"#),
            alumnus("b", r#"{"country_full_name":"portugal","country":"PT"}"#),
            alumnus("c", r#"{"country_full_name":"Switzerland"}"#),
        ];

        let (counts, iso_codes) = count_countries(&alumni);
        assert_eq!(counts["portugal"], 2);
        assert_eq!(counts["switzerland"], 1);
        assert_eq!(iso_codes["portugal"], "PT");
        assert!(!iso_codes.contains_key("switzerland"));
    }

    #[tokio::test]
    async fn test_courses_inserted_once_per_abbreviation() {
        let pool = test_pool().await;
        let sheet = RosterSheet::from_bytes(roster_bytes(&[
            (0, 1, "Courses"),
            (1, 1, "MIEIC MEI"),
            (2, 1, "MIEIC"),
            (3, 1, "L.EIC"),
        ]))
        .unwrap();

        let total = populate_courses(&pool, &sheet, &RosterLayout::default())
            .await
            .unwrap();
        assert_eq!(total, 3);

        // A second pass adds nothing.
        let total = populate_courses(&pool, &sheet, &RosterLayout::default())
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_city_rebuild_is_idempotent_in_row_count() {
        let pool = test_pool().await;
        let repo = AlumnusRepository::new(&pool);
        repo.save("a", r#"{"city":"Porto"}"#).await.unwrap();
        repo.save("b", r#"{"city":"Lisboa"}"#).await.unwrap();

        let geocoder = StubGeocoder::new(vec![
            ("porto", "[41.1,-8.6]"),
            ("lisboa", "[38.7,-9.1]"),
        ]);

        assert_eq!(rebuild_cities(&pool, &geocoder).await.unwrap(), 2);
        assert_eq!(rebuild_cities(&pool, &geocoder).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_geocoding_miss_drops_single_location() {
        let pool = test_pool().await;
        let repo = AlumnusRepository::new(&pool);
        repo.save("a", r#"{"city":"Porto"}"#).await.unwrap();
        repo.save("b", r#"{"city":"Atlantis"}"#).await.unwrap();

        let geocoder = StubGeocoder::new(vec![("porto", "[41.1,-8.6]")]);

        assert_eq!(rebuild_cities(&pool, &geocoder).await.unwrap(), 1);
        let cities = CityRepository::new(&pool).find_all().await.unwrap();
        assert_eq!(cities[0].name, "porto");
        assert_eq!(cities[0].geocode, "[41.1,-8.6]");
    }

    #[tokio::test]
    async fn test_countries_geocoded_by_iso_code() {
        let pool = test_pool().await;
        AlumnusRepository::new(&pool)
            .save("a", r#"{"country_full_name":"Portugal","country":"PT"}"#)
            .await
            .unwrap();

        // Only the ISO code resolves; the full name would miss.
        let geocoder = StubGeocoder::new(vec![("PT", "[39.5,-8.0]")]);

        assert_eq!(rebuild_countries(&pool, &geocoder).await.unwrap(), 1);
        let countries = CountryRepository::new(&pool).find_all().await.unwrap();
        assert_eq!(countries[0].name, "portugal");
        assert_eq!(countries[0].iso_code, "PT");
    }
}
