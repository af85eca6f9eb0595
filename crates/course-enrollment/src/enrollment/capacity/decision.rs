use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::super::domain::CourseId;

/// Verdict for a single seat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    Enroll,
    Waitlist,
    Reject { reason: RejectionReason },
}

/// Reasons a request is refused. Reported to callers, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("student is already enrolled in this course")]
    AlreadyEnrolled,
    #[error("student is already waitlisted for this course")]
    AlreadyWaitlisted,
    #[error("student has already completed this course")]
    AlreadyCompleted,
    #[error("prerequisites not met: {}", join_ids(.missing))]
    PrerequisiteNotMet { missing: Vec<CourseId> },
    #[error("enrollment is closed (window {opens} to {closes})")]
    EnrollmentClosed { opens: NaiveDate, closes: NaiveDate },
}

impl RejectionReason {
    /// Stable identifier used for metrics labels and API payloads.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyEnrolled => "already_enrolled",
            Self::AlreadyWaitlisted => "already_waitlisted",
            Self::AlreadyCompleted => "already_completed",
            Self::PrerequisiteNotMet { .. } => "prerequisite_not_met",
            Self::EnrollmentClosed { .. } => "enrollment_closed",
        }
    }
}

fn join_ids(ids: &[CourseId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
