use crate::config::ConfigError;
use crate::enrollment::{router, CoordinatorError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Enrollment(CoordinatorError),
    Export(csv::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Enrollment(err) => write!(f, "enrollment error: {}", err),
            AppError::Export(err) => write!(f, "roster export error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Enrollment(err) => Some(err),
            AppError::Export(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Enrollment(err) => router::error_status(err),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<CoordinatorError> for AppError {
    fn from(value: CoordinatorError) -> Self {
        Self::Enrollment(value)
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Export(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::{CourseId, RejectionReason, StudentId};

    #[test]
    fn enrollment_errors_keep_their_http_status() {
        let missing = AppError::from(CoordinatorError::CourseNotFound(CourseId(9)));
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let duplicate = AppError::from(CoordinatorError::Rejected(
            RejectionReason::AlreadyEnrolled,
        ));
        assert_eq!(duplicate.into_response().status(), StatusCode::CONFLICT);

        let not_enrolled = AppError::from(CoordinatorError::NotEnrolled {
            student_id: StudentId(1),
            course_id: CourseId(2),
        });
        assert_eq!(not_enrolled.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn infrastructure_errors_map_to_internal_error() {
        let io = AppError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.to_string().starts_with("io error"));
        assert_eq!(
            io.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
