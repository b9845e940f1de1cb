// src/export.rs
//! Excel export of the stored profiles: one scalar row per alumnus followed
//! by contiguous row blocks for experiences and educations, all under one
//! shared header row.

use crate::database::Alumnus;
use crate::extract;
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;
use tracing::warn;

const SCALAR_HEADERS: [&str; 6] = [
    "Full name",
    "Occupation",
    "Headline",
    "City",
    "Country",
    "LinkedIn",
];
const EXPERIENCE_HEADERS: [&str; 4] = ["Company", "Title", "From", "To"];
const EDUCATION_HEADERS: [&str; 5] = ["School", "Degree", "Field of study", "From", "To"];

const EXPERIENCE_OFFSET: u16 = SCALAR_HEADERS.len() as u16;
const EDUCATION_OFFSET: u16 = EXPERIENCE_OFFSET + EXPERIENCE_HEADERS.len() as u16;

/// Render every stored alumnus into an in-memory workbook.
pub fn export_workbook(alumni: &[Alumnus]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    let mut col = 0u16;
    for header in SCALAR_HEADERS
        .iter()
        .chain(EXPERIENCE_HEADERS.iter())
        .chain(EDUCATION_HEADERS.iter())
    {
        worksheet.write_string_with_format(0, col, *header, &bold)?;
        col += 1;
    }

    let mut row = 1u32;

    for alumnus in alumni {
        let Ok(profile) = serde_json::from_str::<Value>(&alumnus.raw_profile_json) else {
            warn!("Unparseable profile for {}, skipping export row", alumnus.linkedin_link);
            continue;
        };

        worksheet.write_string(row, 0, extract::scalar(&profile, "full_name"))?;
        worksheet.write_string(row, 1, extract::scalar(&profile, "occupation"))?;
        worksheet.write_string(row, 2, extract::scalar(&profile, "headline"))?;
        worksheet.write_string(row, 3, extract::scalar(&profile, "city"))?;
        worksheet.write_string(row, 4, extract::scalar(&profile, "country_full_name"))?;
        worksheet.write_string(row, 5, alumnus.linkedin_link.as_str())?;
        row += 1;

        if let Some(Value::Array(experiences)) = profile.get("experiences") {
            for experience in experiences {
                worksheet.write_string(
                    row,
                    EXPERIENCE_OFFSET,
                    extract::scalar(experience, "company"),
                )?;
                worksheet.write_string(
                    row,
                    EXPERIENCE_OFFSET + 1,
                    extract::scalar(experience, "title"),
                )?;
                worksheet.write_string(row, EXPERIENCE_OFFSET + 2, date_cell(experience, "starts_at"))?;
                worksheet.write_string(row, EXPERIENCE_OFFSET + 3, date_cell(experience, "ends_at"))?;
                row += 1;
            }
        }

        if let Some(Value::Array(educations)) = profile.get("education") {
            for education in educations {
                worksheet.write_string(row, EDUCATION_OFFSET, extract::scalar(education, "school"))?;
                worksheet.write_string(
                    row,
                    EDUCATION_OFFSET + 1,
                    extract::scalar(education, "degree_name"),
                )?;
                worksheet.write_string(
                    row,
                    EDUCATION_OFFSET + 2,
                    extract::scalar(education, "field_of_study"),
                )?;
                worksheet.write_string(row, EDUCATION_OFFSET + 3, date_cell(education, "starts_at"))?;
                worksheet.write_string(row, EDUCATION_OFFSET + 4, date_cell(education, "ends_at"))?;
                row += 1;
            }
        }
    }

    workbook
        .save_to_buffer()
        .context("Failed to serialize export workbook")
}

/// "MM/YYYY" from the date parts nested one level under `parent`, degrading
/// to the year alone or an empty cell when parts are missing.
fn date_cell(json: &Value, parent: &str) -> String {
    let year = extract::nested(json, "year", parent);
    let month = extract::nested(json, "month", parent);

    match (month, year) {
        (Some(month), Some(year)) => format!("{}/{}", month, year),
        (None, Some(year)) => year,
        _ => String::new(),
    }
}
