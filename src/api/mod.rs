//! HTTP surface for the analytics service.
//!
//! Two POST endpoints compute the class-wide and per-student reports; CORS is
//! permissive so browser dashboards can call them directly.

pub mod handlers;
mod state;

pub use state::AppState;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Result;
use std::path::PathBuf;

use crate::db;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            db_path: PathBuf::from("labtrack.sqlite3"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(host) = std::env::var("LABTRACKD_HOST") {
            cfg.host = host;
        }
        if let Ok(port) = std::env::var("LABTRACKD_PORT") {
            if let Ok(port) = port.parse() {
                cfg.port = port;
            }
        }
        if let Ok(path) = std::env::var("LABTRACKD_DB") {
            cfg.db_path = PathBuf::from(path);
        }
        cfg
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/class-analytics", web::post().to(handlers::class_analytics))
        .route(
            "/student-analytics",
            web::post().to(handlers::student_analytics),
        );
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = db::open_db(&config.db_path)?;
    let state = web::Data::new(AppState::new(conn));

    log::info!(
        "labtrackd listening on http://{}:{} (db: {})",
        config.host,
        config.port,
        config.db_path.display()
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
