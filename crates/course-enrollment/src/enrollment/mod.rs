//! Seat allocation for capacity-limited courses.
//!
//! [`EnrollmentCoordinator`] is the only writer of enrollment, waitlist and completion
//! records. It consults [`CourseCapacityPolicy`] for every request, serializes work per
//! course, and publishes [`EnrollmentEvent`]s once a change has committed.

pub mod capacity;
pub mod coordinator;
pub mod directory;
pub mod domain;
pub mod events;
mod locks;
pub mod memory;
pub mod repository;
pub mod router;
pub mod views;
pub mod waitlist;

#[cfg(test)]
mod tests;

pub use capacity::{CourseCapacityPolicy, PolicyConfig, PolicyDecision, RejectionReason, SeatRequest};
pub use coordinator::{Clock, CoordinatorError, EnrollmentCoordinator, SystemClock};
pub use directory::{Page, SortKey, StatusFilter, StudentQuery};
pub use domain::{
    Completion, Course, CourseId, Enrollment, EnrollmentId, EnrollmentOutcome, EnrollmentWindow,
    PairState, SeatRelease, Student, StudentId, StudentStanding, WaitlistEntry,
};
pub use events::{EnrollmentEvent, EventHub, EventSubscriber, LogSubscriber};
pub use memory::InMemoryEnrollmentStore;
pub use repository::{EnrollmentRepository, EnrollmentScope, RepositoryError};
pub use router::{enrollment_router, EnrollRequest};
pub use views::{CourseRosterView, StudentView};
pub use waitlist::WaitlistQueue;
