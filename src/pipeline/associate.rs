// src/pipeline/associate.rs
//! Derives the normalized alumni table from the stored profiles and builds
//! the alumni-course associations from the roster year columns.

use crate::config::{year_column, RosterLayout};
use crate::database::{
    AlumniCourseLinkRepository, AlumniEicRepository, AlumnusRepository, CityRepository,
    CountryRepository, CourseRepository,
};
use crate::extract;
use crate::sheet::RosterSheet;
use anyhow::Result;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};

/// Truncate and rebuild alumni_eic from the raw profiles. City and country
/// references resolve against the lookup tables by lowercased name, so the
/// lookup rebuild must have run first.
pub async fn rebuild_normalized(pool: &SqlitePool) -> Result<usize> {
    let links = AlumniCourseLinkRepository::new(pool);
    let eic = AlumniEicRepository::new(pool);

    // Links reference alumni_eic rows, so they go first.
    links.delete_all().await?;
    eic.delete_all().await?;

    let city_ids: HashMap<String, i64> = CityRepository::new(pool)
        .find_all()
        .await?
        .into_iter()
        .map(|c| (c.name, c.id))
        .collect();
    let country_ids: HashMap<String, i64> = CountryRepository::new(pool)
        .find_all()
        .await?
        .into_iter()
        .map(|c| (c.name, c.id))
        .collect();

    let mut rebuilt = 0;

    for alumnus in AlumnusRepository::new(pool).find_all().await? {
        let Ok(profile) = serde_json::from_str::<Value>(&alumnus.raw_profile_json) else {
            warn!("Unparseable profile for {}, skipping", alumnus.linkedin_link);
            continue;
        };

        let display_name = extract::scalar(&profile, "full_name");
        let city = extract::scalar(&profile, "city").to_lowercase();
        let country = extract::scalar(&profile, "country_full_name").to_lowercase();

        let city_id = city_ids.get(&city).copied();
        let country_id = country_ids.get(&country).copied();

        eic.save(&display_name, &alumnus.linkedin_link, city_id, country_id)
            .await?;
        rebuilt += 1;
    }

    info!("Normalized alumni rebuilt: {} rows", rebuilt);
    Ok(rebuilt)
}

/// Cross-reference normalized alumni with their roster row (matched by
/// decoded LinkedIn link) and upsert one link per (alumnus, course) with the
/// conclusion year read from the abbreviation's fixed column. Abbreviations
/// without a year column are skipped.
pub async fn link_courses(
    pool: &SqlitePool,
    sheet: &RosterSheet,
    layout: &RosterLayout,
) -> Result<usize> {
    let courses = CourseRepository::new(pool);
    let links = AlumniCourseLinkRepository::new(pool);

    let mut row_by_link: HashMap<String, usize> = HashMap::new();
    for row in layout.header_rows..sheet.row_count() {
        let Ok(raw) = sheet.cell_text(row, layout.linkedin_column) else {
            continue;
        };
        let link = super::decode_link(&raw);
        if !link.is_empty() {
            row_by_link.insert(link, row);
        }
    }

    let mut linked = 0;

    for alumnus in AlumniEicRepository::new(pool).find_all().await? {
        let Some(&row) = row_by_link.get(&alumnus.linkedin_link) else {
            continue;
        };

        let cell = match sheet.cell_text(row, layout.courses_column) {
            Ok(cell) => cell,
            Err(e) => {
                warn!("Skipping course cell for {}: {}", alumnus.linkedin_link, e);
                continue;
            }
        };

        for abbreviation in cell.split_whitespace() {
            let Some(col) = year_column(abbreviation) else {
                continue;
            };
            let year = match sheet.cell_text(row, col) {
                Ok(year) => year,
                Err(e) => {
                    warn!(
                        "Skipping {} year cell for {}: {}",
                        abbreviation, alumnus.linkedin_link, e
                    );
                    continue;
                }
            };

            let Some(course) = courses.find_by_abbreviation(abbreviation).await? else {
                continue;
            };

            links.upsert(alumnus.id, course.id, &year).await?;
            linked += 1;
        }
    }

    info!("Course links upserted: {}", linked);
    Ok(linked)
}
