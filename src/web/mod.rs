// src/web/mod.rs

pub mod handlers;
pub mod types;

pub use types::*;

use crate::config::AppConfig;
use crate::crypto::ApiKeyCipher;
use crate::database::Database;
use crate::enrichment::EnrichmentClient;
use crate::geocode::GeocodingClient;
use crate::geojson::FeatureCollection;
use anyhow::{Context, Result};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::form::Form;
use rocket::http::{Header, Status};
use rocket::serde::json::Json;
use rocket::{catchers, get, options, post, routes, Request, Response, State};
use tracing::{error, info};

// CORS Fairing
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "POST, GET, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

#[post("/roster", data = "<upload>")]
pub async fn upload_roster(
    upload: Form<RosterUploadForm<'_>>,
    config: &State<AppConfig>,
) -> Result<Json<ActionResponse>, Json<ErrorResponse>> {
    handlers::upload_roster_handler(upload, config).await
}

#[post("/populate", data = "<request>")]
pub async fn populate(
    request: Json<PopulateRequest>,
    config: &State<AppConfig>,
    database: &State<Database>,
    fetcher: &State<EnrichmentClient>,
    geocoder: &State<GeocodingClient>,
) -> Result<Json<PopulateResponse>, Json<ErrorResponse>> {
    handlers::populate_handler(request, config, database, fetcher, geocoder).await
}

#[get("/map?<granularity>&<course>&<from>&<to>")]
pub async fn map(
    granularity: String,
    course: Option<String>,
    from: Option<String>,
    to: Option<String>,
    config: &State<AppConfig>,
    database: &State<Database>,
) -> Result<Json<FeatureCollection>, Json<ErrorResponse>> {
    handlers::map_handler(granularity, course, from, to, config, database).await
}

#[get("/export")]
pub async fn export(database: &State<Database>) -> Result<XlsxResponse, Json<ErrorResponse>> {
    handlers::export_handler(database).await
}

#[get("/report")]
pub async fn report(config: &State<AppConfig>) -> Result<String, Status> {
    handlers::report_handler(config).await
}

#[post("/login", data = "<request>")]
pub async fn login(
    request: Json<LoginRequest>,
    config: &State<AppConfig>,
) -> Result<Json<StatusResponse>, Json<ErrorResponse>> {
    handlers::login_handler(request, config).await
}

#[get("/health")]
pub async fn health(database: &State<Database>) -> Json<StatusResponse> {
    handlers::health_handler(database).await
}

#[options("/<_..>")]
pub async fn options() -> Status {
    Status::Ok
}

// Error catchers
#[rocket::catch(400)]
pub fn bad_request() -> Json<ErrorResponse> {
    Json(ErrorResponse::new(
        "Invalid request format".to_string(),
        "BAD_REQUEST".to_string(),
        vec![
            "Check your request JSON format".to_string(),
            "Verify all required fields are present".to_string(),
        ],
    ))
}

#[rocket::catch(500)]
pub fn internal_error() -> Json<ErrorResponse> {
    Json(ErrorResponse::new(
        "Internal server error".to_string(),
        "INTERNAL_ERROR".to_string(),
        vec![
            "Try again in a few moments".to_string(),
            "Contact the administrator if the problem persists".to_string(),
        ],
    ))
}

// Main server start function
pub async fn start_web_server(config: AppConfig) -> Result<()> {
    config.ensure_directories().await?;

    let database = match Database::new(&config.database_path).await {
        Ok(database) => database,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e);
        }
    };

    let cipher = ApiKeyCipher::from_base64_key(&config.cipher_key)
        .context("Invalid cipher key in configuration")?;
    let fetcher = EnrichmentClient::new(
        config.enrichment_url.clone(),
        cipher,
        config.http_timeout_seconds,
    )?;
    let geocoder = GeocodingClient::new(config.geocoding_url.clone(), config.http_timeout_seconds)?;

    info!("Starting alumni map API server");
    info!("Database: {}", config.database_path.display());
    info!("Roster path: {}", config.roster_path().display());

    let _rocket = rocket::build()
        .attach(Cors)
        .manage(config)
        .manage(database)
        .manage(fetcher)
        .manage(geocoder)
        .register("/api", catchers![bad_request, internal_error])
        .mount(
            "/api",
            routes![
                upload_roster,
                populate,
                map,
                export,
                report,
                login,
                health,
                options,
            ],
        )
        .launch()
        .await;

    Ok(())
}
