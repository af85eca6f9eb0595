use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::capacity::RejectionReason;
use super::coordinator::{CoordinatorError, EnrollmentCoordinator};
use super::directory::StudentQuery;
use super::domain::{CourseId, EnrollmentOutcome, StudentId};
use super::repository::{EnrollmentRepository, RepositoryError};

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollRequest {
    pub student_id: StudentId,
}

/// Router builder exposing the coordinator operations and read views.
pub fn enrollment_router<R>(coordinator: Arc<EnrollmentCoordinator<R>>) -> Router
where
    R: EnrollmentRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/courses/:course_id/enrollments",
            post(enroll_handler::<R>),
        )
        .route(
            "/api/v1/courses/:course_id/enrollments/:student_id",
            delete(unenroll_handler::<R>),
        )
        .route(
            "/api/v1/courses/:course_id/enrollments/:student_id/completion",
            post(complete_handler::<R>),
        )
        .route(
            "/api/v1/courses/:course_id/promotions",
            post(promote_handler::<R>),
        )
        .route(
            "/api/v1/courses/:course_id/waitlist/:student_id",
            delete(withdraw_handler::<R>),
        )
        .route(
            "/api/v1/courses/:course_id/roster",
            get(roster_handler::<R>),
        )
        .route("/api/v1/students", get(search_handler::<R>))
        .route(
            "/api/v1/students/:student_id",
            get(student_handler::<R>),
        )
        .with_state(coordinator)
}

pub(crate) async fn enroll_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path(course_id): Path<u64>,
    axum::Json(request): axum::Json<EnrollRequest>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    let course_id = CourseId(course_id);
    match coordinator.enroll(request.student_id, course_id) {
        Ok(outcome) => {
            let status = match outcome {
                EnrollmentOutcome::Enrolled => StatusCode::CREATED,
                EnrollmentOutcome::Waitlisted { .. } => StatusCode::ACCEPTED,
            };
            let payload = json!({
                "student_id": request.student_id,
                "course_id": course_id,
                "outcome": outcome,
            });
            (status, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn unenroll_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path((course_id, student_id)): Path<(u64, u64)>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.unenroll(StudentId(student_id), CourseId(course_id)) {
        Ok(release) => (StatusCode::OK, axum::Json(release)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn complete_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path((course_id, student_id)): Path<(u64, u64)>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.complete_course(StudentId(student_id), CourseId(course_id)) {
        Ok(release) => (StatusCode::OK, axum::Json(release)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn promote_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path(course_id): Path<u64>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.promote(CourseId(course_id)) {
        Ok(promoted) => {
            (StatusCode::OK, axum::Json(json!({ "promoted": promoted }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn withdraw_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path((course_id, student_id)): Path<(u64, u64)>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.withdraw(StudentId(student_id), CourseId(course_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn roster_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path(course_id): Path<u64>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.course_roster(CourseId(course_id)) {
        Ok(roster) => (StatusCode::OK, axum::Json(roster)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn student_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Path(student_id): Path<u64>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.student_view(StudentId(student_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn search_handler<R>(
    State(coordinator): State<Arc<EnrollmentCoordinator<R>>>,
    Query(query): Query<StudentQuery>,
) -> Response
where
    R: EnrollmentRepository + 'static,
{
    match coordinator.search_students(&query) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_status(err: &CoordinatorError) -> StatusCode {
    match err {
        CoordinatorError::StudentNotFound(_)
        | CoordinatorError::CourseNotFound(_)
        | CoordinatorError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        CoordinatorError::Rejected(
            RejectionReason::PrerequisiteNotMet { .. } | RejectionReason::EnrollmentClosed { .. },
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        CoordinatorError::Rejected(_)
        | CoordinatorError::NotEnrolled { .. }
        | CoordinatorError::NotWaitlisted { .. }
        | CoordinatorError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        CoordinatorError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: CoordinatorError) -> Response {
    let status = error_status(&err);
    let payload = match &err {
        CoordinatorError::Rejected(reason) => json!({
            "error": err.to_string(),
            "reason": reason,
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, axum::Json(payload)).into_response()
}
