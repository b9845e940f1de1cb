// src/database.rs
//! Database connection management, schema and per-entity repositories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

// ===== Core Database Connection Management =====

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create new database connection with automatic setup
    pub async fn new(database_path: &Path) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let pool = SqlitePool::connect(&database_url).await.with_context(|| {
            format!("Failed to connect to database: {}", database_path.display())
        })?;

        info!("Database connection established: {}", database_path.display());

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get pool reference for repository construction
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrate_pool(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}

async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alumni (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            linkedin_link TEXT NOT NULL UNIQUE,
            raw_profile_json TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            abbreviation TEXT NOT NULL UNIQUE
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            geocode TEXT NOT NULL,
            alumni_count INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS countries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            iso_code TEXT NOT NULL DEFAULT '',
            geocode TEXT NOT NULL,
            alumni_count INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alumni_eic (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_name TEXT NOT NULL,
            linkedin_link TEXT NOT NULL UNIQUE,
            city_id INTEGER REFERENCES cities(id),
            country_id INTEGER REFERENCES countries(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alumni_course_links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alumni_eic_id INTEGER NOT NULL REFERENCES alumni_eic(id),
            course_id INTEGER NOT NULL REFERENCES courses(id),
            year_of_conclusion TEXT NOT NULL,
            UNIQUE(alumni_eic_id, course_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alumni_link ON alumni(linkedin_link);")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_alumni_eic_link ON alumni_eic(linkedin_link);")
        .execute(pool)
        .await?;

    Ok(())
}

// ===== Entity Models =====

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alumnus {
    pub id: i64,
    pub linkedin_link: String,
    pub raw_profile_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlumniEic {
    pub id: i64,
    pub display_name: String,
    pub linkedin_link: String,
    pub city_id: Option<i64>,
    pub country_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: i64,
    pub abbreviation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlumniCourseLink {
    pub id: i64,
    pub alumni_eic_id: i64,
    pub course_id: i64,
    pub year_of_conclusion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub geocode: String,
    pub alumni_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Country {
    pub id: i64,
    pub name: String,
    pub iso_code: String,
    pub geocode: String,
    pub alumni_count: i64,
}

// ===== Alumnus Repository =====

pub struct AlumnusRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AlumnusRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<Alumnus>> {
        let alumni = sqlx::query_as::<_, Alumnus>(
            "SELECT id, linkedin_link, raw_profile_json FROM alumni ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(alumni)
    }

    pub async fn exists_by_link(&self, linkedin_link: &str) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM alumni WHERE linkedin_link = ?")
                .bind(linkedin_link)
                .fetch_one(self.pool)
                .await?;

        Ok(count.0 > 0)
    }

    pub async fn save(&self, linkedin_link: &str, raw_profile_json: &str) -> Result<Alumnus> {
        let result = sqlx::query(
            "INSERT INTO alumni (linkedin_link, raw_profile_json) VALUES (?, ?)",
        )
        .bind(linkedin_link)
        .bind(raw_profile_json)
        .execute(self.pool)
        .await?;

        Ok(Alumnus {
            id: result.last_insert_rowid(),
            linkedin_link: linkedin_link.to_string(),
            raw_profile_json: raw_profile_json.to_string(),
        })
    }

    /// Overwrite the stored profile document for an existing link
    pub async fn update_raw_json(&self, linkedin_link: &str, raw_profile_json: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE alumni SET raw_profile_json = ? WHERE linkedin_link = ?",
        )
        .bind(raw_profile_json)
        .bind(linkedin_link)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM alumni").execute(self.pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alumni")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

// ===== AlumniEic Repository =====

pub struct AlumniEicRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AlumniEicRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<AlumniEic>> {
        let alumni = sqlx::query_as::<_, AlumniEic>(
            "SELECT id, display_name, linkedin_link, city_id, country_id FROM alumni_eic ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(alumni)
    }

    pub async fn save(
        &self,
        display_name: &str,
        linkedin_link: &str,
        city_id: Option<i64>,
        country_id: Option<i64>,
    ) -> Result<AlumniEic> {
        let result = sqlx::query(
            "INSERT INTO alumni_eic (display_name, linkedin_link, city_id, country_id) VALUES (?, ?, ?, ?)",
        )
        .bind(display_name)
        .bind(linkedin_link)
        .bind(city_id)
        .bind(country_id)
        .execute(self.pool)
        .await?;

        Ok(AlumniEic {
            id: result.last_insert_rowid(),
            display_name: display_name.to_string(),
            linkedin_link: linkedin_link.to_string(),
            city_id,
            country_id,
        })
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM alumni_eic").execute(self.pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alumni_eic")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

// ===== Course Repository =====

pub struct CourseRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CourseRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<Course>> {
        let courses =
            sqlx::query_as::<_, Course>("SELECT id, abbreviation FROM courses ORDER BY id ASC")
                .fetch_all(self.pool)
                .await?;
        Ok(courses)
    }

    pub async fn find_by_abbreviation(&self, abbreviation: &str) -> Result<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(
            "SELECT id, abbreviation FROM courses WHERE abbreviation = ?",
        )
        .bind(abbreviation)
        .fetch_optional(self.pool)
        .await?;
        Ok(course)
    }

    pub async fn exists_by_abbreviation(&self, abbreviation: &str) -> Result<bool> {
        Ok(self.find_by_abbreviation(abbreviation).await?.is_some())
    }

    pub async fn save(&self, abbreviation: &str) -> Result<Course> {
        let result = sqlx::query("INSERT INTO courses (abbreviation) VALUES (?)")
            .bind(abbreviation)
            .execute(self.pool)
            .await?;

        Ok(Course {
            id: result.last_insert_rowid(),
            abbreviation: abbreviation.to_string(),
        })
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM courses").execute(self.pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courses")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

// ===== AlumniCourseLink Repository =====

pub struct AlumniCourseLinkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AlumniCourseLinkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<AlumniCourseLink>> {
        let links = sqlx::query_as::<_, AlumniCourseLink>(
            "SELECT id, alumni_eic_id, course_id, year_of_conclusion FROM alumni_course_links ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(links)
    }

    pub async fn find_by_alumnus(&self, alumni_eic_id: i64) -> Result<Vec<AlumniCourseLink>> {
        let links = sqlx::query_as::<_, AlumniCourseLink>(
            "SELECT id, alumni_eic_id, course_id, year_of_conclusion FROM alumni_course_links WHERE alumni_eic_id = ? ORDER BY id ASC",
        )
        .bind(alumni_eic_id)
        .fetch_all(self.pool)
        .await?;
        Ok(links)
    }

    /// One link per (alumnus, course); a second write for the same pair
    /// overwrites the stored year (last write wins).
    pub async fn upsert(
        &self,
        alumni_eic_id: i64,
        course_id: i64,
        year_of_conclusion: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO alumni_course_links (alumni_eic_id, course_id, year_of_conclusion)
            VALUES (?, ?, ?)
            ON CONFLICT(alumni_eic_id, course_id)
            DO UPDATE SET year_of_conclusion = excluded.year_of_conclusion
            "#,
        )
        .bind(alumni_eic_id)
        .bind(course_id)
        .bind(year_of_conclusion)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM alumni_course_links")
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alumni_course_links")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

// ===== City Repository =====

pub struct CityRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CityRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<City>> {
        let cities = sqlx::query_as::<_, City>(
            "SELECT id, name, geocode, alumni_count FROM cities ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(cities)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<City>> {
        let city = sqlx::query_as::<_, City>(
            "SELECT id, name, geocode, alumni_count FROM cities WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(city)
    }

    pub async fn save(&self, name: &str, geocode: &str, alumni_count: i64) -> Result<City> {
        let result =
            sqlx::query("INSERT INTO cities (name, geocode, alumni_count) VALUES (?, ?, ?)")
                .bind(name)
                .bind(geocode)
                .bind(alumni_count)
                .execute(self.pool)
                .await?;

        Ok(City {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            geocode: geocode.to_string(),
            alumni_count,
        })
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM cities").execute(self.pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cities")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

// ===== Country Repository =====

pub struct CountryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CountryRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<Country>> {
        let countries = sqlx::query_as::<_, Country>(
            "SELECT id, name, iso_code, geocode, alumni_count FROM countries ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(countries)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Country>> {
        let country = sqlx::query_as::<_, Country>(
            "SELECT id, name, iso_code, geocode, alumni_count FROM countries WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(country)
    }

    pub async fn save(
        &self,
        name: &str,
        iso_code: &str,
        geocode: &str,
        alumni_count: i64,
    ) -> Result<Country> {
        let result = sqlx::query(
            "INSERT INTO countries (name, iso_code, geocode, alumni_count) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(iso_code)
        .bind(geocode)
        .bind(alumni_count)
        .execute(self.pool)
        .await?;

        Ok(Country {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            iso_code: iso_code.to_string(),
            geocode: geocode.to_string(),
            alumni_count,
        })
    }

    pub async fn delete_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM countries").execute(self.pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM countries")
            .fetch_one(self.pool)
            .await?;
        Ok(count.0)
    }
}

/// In-memory pool for tests. Kept to a single connection so every query sees
/// the same :memory: database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory database");
    migrate_pool(&pool).await.expect("migrations failed");
    pool
}
