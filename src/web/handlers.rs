// src/web/handlers.rs

use crate::aggregate::{self, Granularity, LocationFilter};
use crate::config::AppConfig;
use crate::database::{AlumnusRepository, Database};
use crate::enrichment::EnrichmentClient;
use crate::export;
use crate::geocode::GeocodingClient;
use crate::geojson::{self, FeatureCollection};
use crate::pipeline::{self, IngestionMode};
use crate::sheet::RosterSheet;
use crate::web::types::*;

use rocket::form::Form;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use tracing::{error, info};

pub async fn upload_roster_handler(
    mut upload: Form<RosterUploadForm<'_>>,
    config: &State<AppConfig>,
) -> Result<Json<ActionResponse>, Json<ErrorResponse>> {
    let target_path = config.roster_path();

    if let Some(parent) = target_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            error!("Failed to create data directory: {}", e);
            return Err(Json(ErrorResponse::new(
                "Failed to store the roster file".to_string(),
                "FILE_SAVE_ERROR".to_string(),
                vec!["Try uploading the file again".to_string()],
            )));
        }
    }

    match upload.file.persist_to(&target_path).await {
        Ok(_) => {
            info!("Roster workbook stored at {}", target_path.display());
            Ok(Json(ActionResponse::success(
                "Roster uploaded".to_string(),
                "roster_uploaded".to_string(),
            )))
        }
        Err(e) => {
            error!("Failed to persist uploaded roster: {}", e);
            Err(Json(ErrorResponse::new(
                "Failed to store the roster file".to_string(),
                "FILE_SAVE_ERROR".to_string(),
                vec!["Try uploading the file again".to_string()],
            )))
        }
    }
}

pub async fn populate_handler(
    request: Json<PopulateRequest>,
    config: &State<AppConfig>,
    database: &State<Database>,
    fetcher: &State<EnrichmentClient>,
    geocoder: &State<GeocodingClient>,
) -> Result<Json<PopulateResponse>, Json<ErrorResponse>> {
    let Some(mode) = IngestionMode::parse(&request.mode) else {
        return Err(Json(ErrorResponse::new(
            format!("Unknown population mode: {}", request.mode),
            "INVALID_MODE".to_string(),
            vec!["Use mode \"add\" or \"update\"".to_string()],
        )));
    };

    let roster_path = config.roster_path();
    let bytes = match tokio::fs::read(&roster_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Cannot read roster at {}: {}", roster_path.display(), e);
            return Err(Json(ErrorResponse::new(
                "No roster workbook found".to_string(),
                "ROSTER_MISSING".to_string(),
                vec!["Upload a roster before running a population".to_string()],
            )));
        }
    };

    let sheet = match RosterSheet::from_bytes(bytes) {
        Ok(sheet) => sheet,
        Err(e) => {
            error!("Unreadable roster workbook: {}", e);
            return Err(Json(ErrorResponse::new(
                "The stored roster is not a readable workbook".to_string(),
                "ROSTER_UNREADABLE".to_string(),
                vec!["Re-upload the roster as an .xlsx file".to_string()],
            )));
        }
    };

    let report = match pipeline::run_population(
        database.pool(),
        &sheet,
        config,
        fetcher.inner(),
        geocoder.inner(),
        mode,
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("Population run failed: {:#}", e);
            return Err(Json(ErrorResponse::new(
                "Population run failed".to_string(),
                "POPULATION_ERROR".to_string(),
                vec![
                    "Check the server logs".to_string(),
                    "Verify the enrichment API key configuration".to_string(),
                ],
            )));
        }
    };

    let report_available = match pipeline::write_error_report(&config.report_path(), &report) {
        Ok(written) => written.is_some(),
        Err(e) => {
            error!("Failed to write the error report: {:#}", e);
            return Err(Json(ErrorResponse::new(
                "Population finished but the error report could not be written".to_string(),
                "REPORT_WRITE_ERROR".to_string(),
                vec!["Check the output directory permissions".to_string()],
            )));
        }
    };

    Ok(Json(PopulateResponse {
        success: true,
        message: format!("Population finished in {} mode", mode.as_str()),
        stored: report.stored,
        courses: report.courses,
        cities: report.cities,
        countries: report.countries,
        normalized: report.normalized,
        course_links: report.course_links,
        row_errors: report.row_errors.len(),
        api_errors: report.api_errors.len(),
        report_available,
    }))
}

pub async fn map_handler(
    granularity: String,
    course: Option<String>,
    from: Option<String>,
    to: Option<String>,
    config: &State<AppConfig>,
    database: &State<Database>,
) -> Result<Json<FeatureCollection>, Json<ErrorResponse>> {
    let Some(granularity) = Granularity::parse(&granularity) else {
        return Err(Json(ErrorResponse::new(
            format!("Unknown granularity: {}", granularity),
            "INVALID_GRANULARITY".to_string(),
            vec!["Use granularity \"cities\" or \"countries\"".to_string()],
        )));
    };

    let filter = LocationFilter {
        course: course.unwrap_or_default(),
        from_year: from.unwrap_or_default(),
        to_year: to.unwrap_or_default(),
    };

    let collection = match build_map_document(granularity, &filter, config, database).await {
        Ok(collection) => collection,
        Err(e) => {
            error!("Failed to build the map document: {:#}", e);
            return Err(Json(ErrorResponse::new(
                "Failed to build the map document".to_string(),
                "MAP_BUILD_ERROR".to_string(),
                vec![
                    "Run a population first".to_string(),
                    "Check the server logs".to_string(),
                ],
            )));
        }
    };

    Ok(Json(collection))
}

/// Aggregate, write the GeoJSON file for this filter combination and read it
/// back as the response body.
async fn build_map_document(
    granularity: Granularity,
    filter: &LocationFilter,
    config: &AppConfig,
    database: &Database,
) -> anyhow::Result<FeatureCollection> {
    let alumni = aggregate::load_views(database.pool()).await?;
    let locations = aggregate::load_locations(database.pool(), granularity).await?;
    let aggregates = aggregate::build_aggregates(granularity, filter, &alumni, &locations);

    let path = config
        .output_dir
        .join(geojson::output_file_name(granularity, filter));

    geojson::create_empty(&path)?;
    for aggregate in &aggregates {
        geojson::append_location_feature(&path, aggregate)?;
    }

    info!(
        "Map document written: {} ({} features)",
        path.display(),
        aggregates.len()
    );

    geojson::read_collection(&path)
}

pub async fn export_handler(
    database: &State<Database>,
) -> Result<XlsxResponse, Json<ErrorResponse>> {
    let alumni = match AlumnusRepository::new(database.pool()).find_all().await {
        Ok(alumni) => alumni,
        Err(e) => {
            error!("Failed to load alumni for export: {:#}", e);
            return Err(Json(ErrorResponse::new(
                "Failed to load the stored profiles".to_string(),
                "EXPORT_ERROR".to_string(),
                vec!["Check the server logs".to_string()],
            )));
        }
    };

    match export::export_workbook(&alumni) {
        Ok(data) => Ok(XlsxResponse::new(data, "alumni_export.xlsx".to_string())),
        Err(e) => {
            error!("Failed to build the export workbook: {:#}", e);
            Err(Json(ErrorResponse::new(
                "Failed to build the export workbook".to_string(),
                "EXPORT_ERROR".to_string(),
                vec!["Check the server logs".to_string()],
            )))
        }
    }
}

pub async fn report_handler(config: &State<AppConfig>) -> Result<String, Status> {
    let path = config.report_path();

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Status::NotFound),
        Err(e) => {
            error!("Failed to read the report at {}: {}", path.display(), e);
            Err(Status::InternalServerError)
        }
    }
}

pub async fn login_handler(
    request: Json<LoginRequest>,
    config: &State<AppConfig>,
) -> Result<Json<StatusResponse>, Json<ErrorResponse>> {
    if request.username == config.admin_username && request.password == config.admin_password {
        info!("Administrator logged in");
        Ok(Json(StatusResponse {
            success: true,
            message: "Logged in".to_string(),
        }))
    } else {
        Err(Json(ErrorResponse::new(
            "Invalid credentials".to_string(),
            "INVALID_CREDENTIALS".to_string(),
            vec!["Check the configured administrator credentials".to_string()],
        )))
    }
}

pub async fn health_handler(database: &State<Database>) -> Json<StatusResponse> {
    match database.health_check().await {
        Ok(_) => Json(StatusResponse {
            success: true,
            message: "OK".to_string(),
        }),
        Err(e) => {
            error!("Health check failed: {:#}", e);
            Json(StatusResponse {
                success: false,
                message: "Database unavailable".to_string(),
            })
        }
    }
}
