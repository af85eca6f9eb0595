mod config;
mod decision;

pub use config::PolicyConfig;
pub use decision::{PolicyDecision, RejectionReason};

use chrono::NaiveDate;

use super::domain::{Course, PairState, StudentStanding};

/// Everything the policy looks at for one (student, course) pair.
#[derive(Debug, Clone, Copy)]
pub struct SeatRequest<'a> {
    pub course: &'a Course,
    pub standing: &'a StudentStanding,
    pub active_enrollments: u32,
    /// Date of a direct request. Promotions pass `None` and skip the enrollment window.
    pub requested_on: Option<NaiveDate>,
}

/// Pure decision function for seat requests. Holds no state besides its configuration.
#[derive(Debug, Clone, Default)]
pub struct CourseCapacityPolicy {
    config: PolicyConfig,
}

impl CourseCapacityPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn decide(&self, request: &SeatRequest<'_>) -> PolicyDecision {
        let course = request.course;

        let state = request.standing.state_for(course.id);
        match state {
            PairState::Enrolled => return reject(RejectionReason::AlreadyEnrolled),
            PairState::Waitlisted => return reject(RejectionReason::AlreadyWaitlisted),
            PairState::Completed if !self.config.allow_retake => {
                return reject(RejectionReason::AlreadyCompleted)
            }
            PairState::Completed | PairState::None => {}
        }

        let missing = request.standing.missing_prerequisites(course);
        if !missing.is_empty() {
            return reject(RejectionReason::PrerequisiteNotMet { missing });
        }

        if let (Some(window), Some(date)) = (course.enrollment_window, request.requested_on) {
            if !window.contains(date) {
                return reject(RejectionReason::EnrollmentClosed {
                    opens: window.opens,
                    closes: window.closes,
                });
            }
        }

        if course.is_full(request.active_enrollments) {
            // A retake needs a free seat; queueing would leave the completion in limbo.
            if state == PairState::Completed {
                return reject(RejectionReason::AlreadyCompleted);
            }
            PolicyDecision::Waitlist
        } else {
            PolicyDecision::Enroll
        }
    }
}

fn reject(reason: RejectionReason) -> PolicyDecision {
    PolicyDecision::Reject { reason }
}
