pub mod aggregate;
pub mod config;
pub mod crypto;
pub mod database;
pub mod enrichment;
pub mod export;
pub mod extract;
pub mod geocode;
pub mod geojson;
pub mod pipeline;
pub mod sheet;
pub mod web;

pub use config::AppConfig;
pub use web::start_web_server;
