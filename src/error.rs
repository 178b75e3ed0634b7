//! Error types for the storage layer and the HTTP boundary.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, error::BlockingError};
use log::error;
use serde_json::json;
use thiserror::Error;

/// Entity kinds, used to word not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Patient,
    Appointment,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Appointment => "Appointment",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} {id} not found", .entity.as_str())]
    NotFound { entity: Entity, id: i64 },

    #[error("patient {patient_id} does not exist")]
    InvalidReference { patient_id: i64 },

    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{} not found", .0.as_str())]
    NotFound(Entity),

    #[error("Patient does not exist")]
    InvalidReference,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => Self::NotFound(entity),
            StoreError::InvalidReference { .. } => Self::InvalidReference,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        Self::Internal(format!("blocking task failed: {err}"))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidReference => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let detail = match self {
            Self::Internal(cause) => {
                error!("request failed: {cause}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "detail": detail }))
    }
}
