// src/geojson.rs
//! GeoJSON FeatureCollection files, one per filter combination. The file is
//! the database here: every append re-parses and rewrites the whole document,
//! so concurrent writers against the same path are unsupported.

use crate::aggregate::{Granularity, LocationAggregate, LocationFilter};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub names: Vec<String>,
    #[serde(rename = "memberCount")]
    pub member_count: usize,
    #[serde(rename = "linksByMember")]
    pub links_by_member: BTreeMap<String, String>,
    #[serde(rename = "coursesByMember")]
    pub courses_by_member: BTreeMap<String, BTreeMap<String, String>>,
}

/// Deterministic output name: granularity + course + fromYear + toYear.
/// With no filters this degenerates to the bare granularity name.
pub fn output_file_name(granularity: Granularity, filter: &LocationFilter) -> String {
    format!(
        "{}{}{}{}.geojson",
        granularity.as_str(),
        filter.course,
        filter.from_year,
        filter.to_year
    )
}

/// Write an empty FeatureCollection, replacing whatever was at `path`.
pub fn create_empty(path: &Path) -> Result<()> {
    let collection = FeatureCollection {
        kind: "FeatureCollection".to_string(),
        features: Vec::new(),
    };
    write_collection(path, &collection)
}

/// Append one aggregated location as a Feature: read the document back,
/// push the new feature, rewrite the file.
pub fn append_location_feature(path: &Path, aggregate: &LocationAggregate) -> Result<()> {
    let mut collection = read_collection(path)?;

    collection.features.push(Feature {
        kind: "Feature".to_string(),
        geometry: Geometry {
            kind: "Point".to_string(),
            coordinates: reverse_coordinates(&aggregate.geocode)?,
        },
        properties: FeatureProperties {
            names: aggregate.names.clone(),
            member_count: aggregate.member_count,
            links_by_member: aggregate.links_by_member.clone(),
            courses_by_member: aggregate.courses_by_member.clone(),
        },
    });

    write_collection(path, &collection)
}

pub fn read_collection(path: &Path) -> Result<FeatureCollection> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read GeoJSON file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Malformed GeoJSON file: {}", path.display()))
}

fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string(collection)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write GeoJSON file: {}", path.display()))
}

/// The stored geocode is "[lat,lng]" but GeoJSON wants [lng,lat]. The string
/// is parsed as a JSON array and walked from the last index to the first,
/// which performs exactly that reversal.
fn reverse_coordinates(geocode: &str) -> Result<Vec<f64>> {
    let stored: Vec<f64> = serde_json::from_str(geocode)
        .with_context(|| format!("Geocode is not a JSON array: {}", geocode))?;

    let mut coordinates = Vec::with_capacity(stored.len());
    for value in stored.iter().rev() {
        coordinates.push(*value);
    }
    Ok(coordinates)
}
