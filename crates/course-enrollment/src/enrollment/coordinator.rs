use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::capacity::{
    CourseCapacityPolicy, PolicyConfig, PolicyDecision, RejectionReason, SeatRequest,
};
use super::directory::{self, Page, StudentQuery};
use super::domain::{
    Completion, Course, CourseId, Enrollment, EnrollmentId, EnrollmentOutcome, PairState,
    SeatRelease, Student, StudentId,
};
use super::events::{EnrollmentEvent, EventHub, EventSubscriber};
use super::locks::CourseLocks;
use super::repository::{EnrollmentRepository, EnrollmentScope, RepositoryError};
use super::views::{CourseRosterView, StudentView};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    let id = ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EnrollmentId(format!("enr-{id:06}"))
}

/// Coordinates seat allocation, waitlists and completions for every course.
///
/// Each mutating operation holds the course's mutex for its whole decide-and-mutate
/// sequence and runs inside one repository transaction. Events are published only after
/// the transaction commits and the mutex is released, so subscribers may call back in.
/// A failed operation publishes nothing besides `Rejected`.
pub struct EnrollmentCoordinator<R> {
    repository: Arc<R>,
    policy: CourseCapacityPolicy,
    locks: CourseLocks,
    events: Arc<EventHub>,
    clock: Arc<dyn Clock>,
}

impl<R> EnrollmentCoordinator<R>
where
    R: EnrollmentRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: PolicyConfig) -> Self {
        Self::with_clock(repository, config, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, config: PolicyConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            policy: CourseCapacityPolicy::new(config),
            locks: CourseLocks::default(),
            events: Arc::new(EventHub::default()),
            clock,
        }
    }

    pub fn register_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.events.register(subscriber);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnrollmentEvent> {
        self.events.subscribe()
    }

    pub fn policy(&self) -> &CourseCapacityPolicy {
        &self.policy
    }

    /// Request a seat. Returns `Enrolled` when a seat is free, `Waitlisted` when the course
    /// is full, and `Rejected` when the policy refuses the pair.
    pub fn enroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<EnrollmentOutcome, CoordinatorError> {
        let lock = self.locks.for_course(course_id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        let mut events = Vec::new();
        let result = self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            let student = load_student(scope, student_id)?;
            let course = load_course(scope, course_id)?;
            let standing = scope.standing(student.id)?;
            let active_enrollments = scope.count_active_enrollments(course.id)?;

            let decision = self.policy.decide(&SeatRequest {
                course: &course,
                standing: &standing,
                active_enrollments,
                requested_on: Some(now.date_naive()),
            });

            match decision {
                PolicyDecision::Reject { reason } => Err(CoordinatorError::Rejected(reason)),
                PolicyDecision::Enroll => {
                    let prior = if standing.state_for(course.id) == PairState::Completed {
                        scope.remove_completion(student.id, course.id)?
                    } else {
                        None
                    };
                    let mut enrollment = new_enrollment(student.id, course.id, now);
                    enrollment.previously_completed_at = prior.map(|c| c.completed_at);
                    scope.upsert_enrollment(enrollment)?;
                    events.push(EnrollmentEvent::Enrolled {
                        student_id,
                        course_id,
                        at: now,
                    });
                    Ok(EnrollmentOutcome::Enrolled)
                }
                PolicyDecision::Waitlist => {
                    scope.append_waitlist(student.id, course.id, now)?;
                    let queue = scope.waitlist(course.id)?;
                    let position = queue.position_of(student.id).unwrap_or(queue.len());
                    events.push(EnrollmentEvent::Waitlisted {
                        student_id,
                        course_id,
                        position,
                        at: now,
                    });
                    Ok(EnrollmentOutcome::Waitlisted { position })
                }
            }
        });
        drop(guard);

        match result {
            Ok(outcome) => {
                info!(%student_id, %course_id, outcome = outcome.label(), "enroll committed");
                self.events.publish_all(events);
                Ok(outcome)
            }
            Err(CoordinatorError::Rejected(reason)) => {
                self.events.publish(EnrollmentEvent::Rejected {
                    student_id,
                    course_id,
                    reason: reason.clone(),
                    at: now,
                });
                Err(CoordinatorError::Rejected(reason))
            }
            Err(err) => {
                warn!(%student_id, %course_id, error = %err, "enroll failed");
                Err(err)
            }
        }
    }

    /// Release an active seat and promote the head of the waitlist into it.
    pub fn unenroll(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<SeatRelease, CoordinatorError> {
        let lock = self.locks.for_course(course_id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        let mut events = Vec::new();
        let release = self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            load_student(scope, student_id)?;
            let course = load_course(scope, course_id)?;

            let Some(enrollment) = scope.find_active_enrollment(student_id, course_id)? else {
                return Err(CoordinatorError::NotEnrolled {
                    student_id,
                    course_id,
                });
            };
            scope.delete_enrollment(student_id, course_id)?;
            if let Some(completed_at) = enrollment.previously_completed_at {
                scope.record_completion(Completion {
                    student_id,
                    course_id,
                    completed_at,
                })?;
            }
            events.push(EnrollmentEvent::Unenrolled {
                student_id,
                course_id,
                at: now,
            });

            let promoted = self.promote_within(scope, &course, now, &mut events)?;
            Ok(SeatRelease { promoted })
        });
        drop(guard);
        let release = release?;

        info!(%student_id, %course_id, promoted = ?release.promoted, "unenroll committed");
        self.events.publish_all(events);
        Ok(release)
    }

    /// Mark an active enrollment as completed, freeing the seat for the waitlist.
    pub fn complete_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<SeatRelease, CoordinatorError> {
        let lock = self.locks.for_course(course_id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        let mut events = Vec::new();
        let release = self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            load_student(scope, student_id)?;
            let course = load_course(scope, course_id)?;

            if !scope.delete_enrollment(student_id, course_id)? {
                return Err(CoordinatorError::NotEnrolled {
                    student_id,
                    course_id,
                });
            }
            scope.record_completion(Completion {
                student_id,
                course_id,
                completed_at: now,
            })?;
            events.push(EnrollmentEvent::Completed {
                student_id,
                course_id,
                at: now,
            });

            let promoted = self.promote_within(scope, &course, now, &mut events)?;
            Ok(SeatRelease { promoted })
        });
        drop(guard);
        let release = release?;

        info!(%student_id, %course_id, promoted = ?release.promoted, "completion committed");
        self.events.publish_all(events);
        Ok(release)
    }

    /// Leave a course waitlist without taking a seat.
    pub fn withdraw(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<(), CoordinatorError> {
        let lock = self.locks.for_course(course_id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        let withdrawn = self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            load_student(scope, student_id)?;
            load_course(scope, course_id)?;
            if scope.remove_waitlist_entry(student_id, course_id)? {
                Ok(())
            } else {
                Err(CoordinatorError::NotWaitlisted {
                    student_id,
                    course_id,
                })
            }
        });
        drop(guard);
        withdrawn?;

        info!(%student_id, %course_id, "waitlist withdrawal committed");
        self.events.publish(EnrollmentEvent::Withdrawn {
            student_id,
            course_id,
            at: now,
        });
        Ok(())
    }

    /// Move the earliest eligible waitlisted student into a free seat, if there is one.
    pub fn promote(&self, course_id: CourseId) -> Result<Option<StudentId>, CoordinatorError> {
        let lock = self.locks.for_course(course_id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let now = self.clock.now();
        let mut events = Vec::new();
        let promoted = self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            let course = load_course(scope, course_id)?;
            self.promote_within(scope, &course, now, &mut events)
        });
        drop(guard);
        let promoted = promoted?;

        if let Some(student_id) = promoted {
            info!(%student_id, %course_id, "promotion committed");
        }
        self.events.publish_all(events);
        Ok(promoted)
    }

    pub fn student_view(&self, student_id: StudentId) -> Result<StudentView, CoordinatorError> {
        self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            let student = load_student(scope, student_id)?;
            let standing = scope.standing(student.id)?;
            let courses = course_index(scope)?;
            Ok(StudentView::project(student, &standing, &courses))
        })
    }

    pub fn course_roster(&self, course_id: CourseId) -> Result<CourseRosterView, CoordinatorError> {
        self.repository.transaction(|scope| -> Result<_, CoordinatorError> {
            let course = load_course(scope, course_id)?;
            Ok(CourseRosterView::load(scope, course)?)
        })
    }

    pub fn search_students(
        &self,
        query: &StudentQuery,
    ) -> Result<Page<StudentView>, CoordinatorError> {
        self.repository
            .transaction(|scope| -> Result<_, CoordinatorError> {
                Ok(directory::search_students(scope, query)?)
            })
    }

    /// Walks the waitlist head-first. Rejected entries are dropped and the walk continues;
    /// a full course stops the walk without touching the queue.
    fn promote_within(
        &self,
        scope: &mut dyn EnrollmentScope,
        course: &Course,
        now: DateTime<Utc>,
        events: &mut Vec<EnrollmentEvent>,
    ) -> Result<Option<StudentId>, CoordinatorError> {
        loop {
            let queue = scope.waitlist(course.id)?;
            let Some(head) = queue.head().cloned() else {
                return Ok(None);
            };
            let student_id = head.student_id;

            if scope.student(student_id)?.is_none() {
                debug!(%student_id, course_id = %course.id, "dropping waitlist entry for unknown student");
                scope.remove_waitlist_entry(student_id, course.id)?;
                continue;
            }

            let mut standing = scope.standing(student_id)?;
            standing.waitlisted.remove(&course.id);
            let active_enrollments = scope.count_active_enrollments(course.id)?;

            let decision = self.policy.decide(&SeatRequest {
                course,
                standing: &standing,
                active_enrollments,
                requested_on: None,
            });

            match decision {
                PolicyDecision::Waitlist => return Ok(None),
                PolicyDecision::Reject { reason } => {
                    debug!(%student_id, course_id = %course.id, reason = reason.code(), "skipping waitlisted student");
                    scope.remove_waitlist_entry(student_id, course.id)?;
                    events.push(EnrollmentEvent::Rejected {
                        student_id,
                        course_id: course.id,
                        reason,
                        at: now,
                    });
                }
                PolicyDecision::Enroll => {
                    scope.remove_waitlist_entry(student_id, course.id)?;
                    scope.upsert_enrollment(new_enrollment(student_id, course.id, now))?;
                    events.push(EnrollmentEvent::Promoted {
                        student_id,
                        course_id: course.id,
                        at: now,
                    });
                    return Ok(Some(student_id));
                }
            }
        }
    }
}

fn new_enrollment(student_id: StudentId, course_id: CourseId, now: DateTime<Utc>) -> Enrollment {
    Enrollment {
        id: next_enrollment_id(),
        student_id,
        course_id,
        created_at: now,
        previously_completed_at: None,
    }
}

fn load_student(
    scope: &dyn EnrollmentScope,
    student_id: StudentId,
) -> Result<Student, CoordinatorError> {
    scope
        .student(student_id)?
        .ok_or(CoordinatorError::StudentNotFound(student_id))
}

fn load_course(scope: &dyn EnrollmentScope, course_id: CourseId) -> Result<Course, CoordinatorError> {
    scope
        .course(course_id)?
        .ok_or(CoordinatorError::CourseNotFound(course_id))
}

fn course_index(scope: &dyn EnrollmentScope) -> Result<BTreeMap<CourseId, Course>, RepositoryError> {
    Ok(scope
        .courses()?
        .into_iter()
        .map(|course| (course.id, course))
        .collect())
}

/// Error raised by the enrollment coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("student {0} not found")]
    StudentNotFound(StudentId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error(transparent)]
    Rejected(#[from] RejectionReason),
    #[error("student {student_id} is not enrolled in course {course_id}")]
    NotEnrolled {
        student_id: StudentId,
        course_id: CourseId,
    },
    #[error("student {student_id} is not waitlisted for course {course_id}")]
    NotWaitlisted {
        student_id: StudentId,
        course_id: CourseId,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
