use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rentals::domain::rental::{AdmissionError, RegistryError, VehicleError};
use tracing::error;

use crate::payload::{DateRange, ErrorBody};

/// Status code plus the `{kind, message, conflictingRange?}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: String) -> Self {
        Self {
            status,
            body: ErrorBody {
                kind,
                message,
                conflicting_range: None,
            },
        }
    }

    fn internal(error: &dyn std::error::Error) -> Self {
        error!("request failed: {}", error);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "InternalError",
            "Something went wrong, please try again later".to_owned(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(value: AdmissionError) -> Self {
        let status = match &value {
            AdmissionError::InvalidRange { .. } => StatusCode::BAD_REQUEST,
            AdmissionError::VehicleNotFound { .. }
            | AdmissionError::ReservationNotFound { .. } => StatusCode::NOT_FOUND,
            AdmissionError::ReservationConflict { .. }
            | AdmissionError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            AdmissionError::ConcurrentModification => StatusCode::SERVICE_UNAVAILABLE,
            AdmissionError::IdUnavailable { .. } | AdmissionError::DataAccess { .. } => {
                return Self::internal(&value)
            }
        };
        let mut error = Self::new(status, value.kind(), value.to_string());
        if let AdmissionError::ReservationConflict { period, .. } = &value {
            error.body.conflicting_range = Some(DateRange::from(period));
        }
        error
    }
}

impl From<RegistryError> for ApiError {
    fn from(value: RegistryError) -> Self {
        match &value {
            RegistryError::VehicleNotFound { .. } => Self::new(
                StatusCode::NOT_FOUND,
                "VehicleNotFoundError",
                value.to_string(),
            ),
            RegistryError::Vehicle(VehicleError::NameIsBlank | VehicleError::PlateIsBlank) => {
                Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "ValidationError",
                    value.to_string(),
                )
            }
            RegistryError::Vehicle(VehicleError::AlreadyRetired) => Self::new(
                StatusCode::CONFLICT,
                "InvalidStatusTransition",
                value.to_string(),
            ),
            _ => Self::internal(&value),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "ValidationError",
            value.body_text(),
        )
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "ValidationError",
            value.body_text(),
        )
    }
}
