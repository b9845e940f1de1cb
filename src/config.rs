// src/config.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// Fixed roster column layout. Column indices are zero-based and match the
/// workbook the administration office exports.
#[derive(Debug, Clone, Deserialize)]
pub struct RosterLayout {
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
    #[serde(default = "default_linkedin_column")]
    pub linkedin_column: usize,
    #[serde(default = "default_courses_column")]
    pub courses_column: usize,
}

fn default_header_rows() -> usize {
    1
}

fn default_linkedin_column() -> usize {
    0
}

fn default_courses_column() -> usize {
    1
}

impl Default for RosterLayout {
    fn default() -> Self {
        Self {
            header_rows: default_header_rows(),
            linkedin_column: default_linkedin_column(),
            courses_column: default_courses_column(),
        }
    }
}

/// Conclusion-year column for a degree abbreviation. Unknown abbreviations
/// have no year column and are skipped by the associator.
pub fn year_column(abbreviation: &str) -> Option<usize> {
    match abbreviation {
        "LEIC" => Some(2),
        "MEI" => Some(3),
        "MIEIC" => Some(4),
        "L.EIC" => Some(5),
        "M.EIC" => Some(6),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pictures_dir: PathBuf,
    pub database_path: PathBuf,
    pub enrichment_url: String,
    pub geocoding_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub http_timeout_seconds: u64,
    pub encrypted_api_key: String,
    pub cipher_key: String,
    pub admin_username: String,
    pub admin_password: String,
    #[serde(default)]
    pub roster: RosterLayout,
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    local: AppConfig,
    production: AppConfig,
}

impl AppConfig {
    /// Load configuration based on environment
    pub fn load() -> Result<Self> {
        let environment = Self::get_environment();
        info!("Loading configuration for environment: {}", environment);

        Self::load_from_file(&environment)
    }

    fn get_environment() -> String {
        std::env::var("ALUMNIMAP_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .unwrap_or_else(|_| "local".to_string())
    }

    fn load_from_file(environment: &str) -> Result<Self> {
        let config_path = PathBuf::from("config.yaml");
        if !config_path.exists() {
            anyhow::bail!(
                "config.yaml not found in current directory. Server cannot start without configuration."
            );
        }

        let config_content =
            std::fs::read_to_string(&config_path).context("Failed to read config.yaml")?;

        let config_file: ConfigFile =
            serde_yaml::from_str(&config_content).context("Failed to parse config.yaml")?;

        let env_config = match environment {
            "production" => config_file.production,
            _ => config_file.local,
        };

        Ok(Self {
            data_dir: Self::resolve_path(&env_config.data_dir)?,
            output_dir: Self::resolve_path(&env_config.output_dir)?,
            pictures_dir: Self::resolve_path(&env_config.pictures_dir)?,
            database_path: Self::resolve_path(&env_config.database_path)?,
            ..env_config
        })
    }

    fn resolve_path(path: &PathBuf) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.clone())
        } else {
            let current_dir = std::env::current_dir().context("Failed to get current directory")?;
            Ok(current_dir.join(path))
        }
    }

    /// Where the uploaded roster workbook is stored between upload and population
    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join("roster.xlsx")
    }

    /// Where the error report of the last population run is written
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("population_report.txt")
    }

    /// Ensure all configured directories exist
    pub async fn ensure_directories(&self) -> Result<()> {
        let dirs = [&self.data_dir, &self.output_dir, &self.pictures_dir];

        for dir in dirs {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        if let Some(db_parent) = self.database_path.parent() {
            tokio::fs::create_dir_all(db_parent).await.with_context(|| {
                format!("Failed to create database directory: {}", db_parent.display())
            })?;
        }

        info!("All configured directories ensured to exist");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_column_known_abbreviations() {
        assert!(year_column("LEIC").is_some());
        assert!(year_column("MEI").is_some());
        assert!(year_column("MIEIC").is_some());
        assert!(year_column("L.EIC").is_some());
        assert!(year_column("M.EIC").is_some());
    }

    #[test]
    fn test_year_column_unknown_abbreviation() {
        assert_eq!(year_column("MESW"), None);
        assert_eq!(year_column("leic"), None);
        assert_eq!(year_column(""), None);
    }

    #[test]
    fn test_year_columns_are_distinct() {
        let cols: Vec<usize> = ["LEIC", "MEI", "MIEIC", "L.EIC", "M.EIC"]
            .iter()
            .filter_map(|a| year_column(a))
            .collect();
        let mut deduped = cols.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(cols.len(), deduped.len());
    }
}
