//! Patients & Appointments API.
//!
//! Request handlers sit on top of a transactional SQLite storage client; the
//! pieces are wired together in [`configure`], which both the server binary
//! and the integration tests mount.

use actix_web::web;

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod schema;
pub mod storage;

pub use config::Config;
pub use db::{DbPool, init_pool};
pub use error::{ApiError, StoreError};
pub use storage::{Page, Storage};

/// Registers every route plus the extractor configs that turn malformed
/// bodies, ids and query strings into 422 responses.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(path_config())
        .app_data(query_config())
        .route("/", web::get().to(handlers::root))
        .service(
            web::scope("/patients")
                .service(
                    web::resource(["", "/"])
                        .route(web::get().to(handlers::list_patients))
                        .route(web::post().to(handlers::create_patient)),
                )
                .service(
                    web::resource("/{patient_id}")
                        .route(web::get().to(handlers::get_patient))
                        .route(web::put().to(handlers::update_patient))
                        .route(web::delete().to(handlers::delete_patient)),
                ),
        )
        .service(
            web::scope("/appointments")
                .service(
                    web::resource(["", "/"])
                        .route(web::get().to(handlers::list_appointments))
                        .route(web::post().to(handlers::create_appointment)),
                )
                .service(
                    web::resource("/{appointment_id}")
                        .route(web::get().to(handlers::get_appointment))
                        .route(web::put().to(handlers::update_appointment))
                        .route(web::delete().to(handlers::delete_appointment)),
                ),
        );
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}
