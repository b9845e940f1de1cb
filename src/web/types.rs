// src/web/types.rs

use rocket::form::FromForm;
use rocket::fs::TempFile;
use rocket::http::ContentType;
use rocket::response::{self, Responder};
use rocket::serde::{Deserialize, Serialize};
use rocket::{Request, Response};

/// Binary download with an attachment filename; used for the Excel export.
pub struct XlsxResponse {
    pub data: Vec<u8>,
    pub filename: String,
}

impl XlsxResponse {
    pub fn new(data: Vec<u8>, filename: String) -> Self {
        Self { data, filename }
    }
}

impl<'r> Responder<'r, 'static> for XlsxResponse {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(ContentType::new(
                "application",
                "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ))
            .raw_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.filename),
            )
            .sized_body(self.data.len(), std::io::Cursor::new(self.data))
            .ok()
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub suggestions: Vec<String>,
}

impl ErrorResponse {
    pub fn new(error: String, error_code: String, suggestions: Vec<String>) -> Self {
        Self {
            success: false,
            error,
            error_code,
            suggestions,
        }
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    pub action: String,
}

impl ActionResponse {
    pub fn success(message: String, action: String) -> Self {
        Self {
            success: true,
            message,
            action,
        }
    }
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct PopulateRequest {
    pub mode: String,
}

/// Summary of one population run, mirroring the counts logged on the server.
#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct PopulateResponse {
    pub success: bool,
    pub message: String,
    pub stored: usize,
    pub courses: i64,
    pub cities: i64,
    pub countries: i64,
    pub normalized: usize,
    pub course_links: usize,
    pub row_errors: usize,
    pub api_errors: usize,
    pub report_available: bool,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

#[derive(FromForm)]
pub struct RosterUploadForm<'f> {
    pub file: TempFile<'f>,
}
