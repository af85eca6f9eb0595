use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::enrollment::coordinator::{Clock, EnrollmentCoordinator};
use crate::enrollment::domain::{
    Completion, Course, CourseId, Enrollment, EnrollmentWindow, Student, StudentId,
    StudentStanding, WaitlistEntry,
};
use crate::enrollment::events::{EnrollmentEvent, EventSubscriber};
use crate::enrollment::memory::InMemoryEnrollmentStore;
use crate::enrollment::repository::{EnrollmentRepository, EnrollmentScope, RepositoryError};
use crate::enrollment::waitlist::WaitlistQueue;
use crate::enrollment::PolicyConfig;

pub(super) const ALGORITHMS: CourseId = CourseId(10);
pub(super) const DATA_STRUCTURES: CourseId = CourseId(20);
pub(super) const COMPILERS: CourseId = CourseId(30);
pub(super) const SEMINAR: CourseId = CourseId(40);

pub(super) const ADA: StudentId = StudentId(1);
pub(super) const ALAN: StudentId = StudentId(2);
pub(super) const GRACE: StudentId = StudentId(3);
pub(super) const EDSGER: StudentId = StudentId(4);
pub(super) const BARBARA: StudentId = StudentId(5);
pub(super) const DONALD: StudentId = StudentId(6);

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) struct FixedClock(pub(super) DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(super) fn student(id: StudentId, name: &str, email: &str) -> Student {
    Student {
        id,
        name: name.to_string(),
        email: email.to_string(),
        enrolled_on: Utc
            .with_ymd_and_hms(2025, 8, 15, 9, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

pub(super) fn catalog() -> Vec<Course> {
    vec![
        Course::new(ALGORITHMS, "Algorithms").with_capacity(2),
        Course::new(DATA_STRUCTURES, "Data Structures"),
        Course::new(COMPILERS, "Compilers")
            .with_capacity(1)
            .with_prerequisite(ALGORITHMS),
        Course::new(SEMINAR, "Research Seminar").with_window(EnrollmentWindow {
            opens: date(2025, 1, 6),
            closes: date(2025, 1, 31),
        }),
    ]
}

pub(super) fn roster() -> Vec<Student> {
    vec![
        student(ADA, "Ada Lovelace", "ada@example.edu"),
        student(ALAN, "Alan Turing", "alan@example.edu"),
        student(GRACE, "Grace Hopper", "grace@example.edu"),
        student(EDSGER, "Edsger Dijkstra", "edsger@example.edu"),
        student(BARBARA, "Barbara Liskov", "barbara@example.edu"),
        student(DONALD, "Donald Knuth", "donald@example.edu"),
    ]
}

pub(super) fn seeded_store() -> InMemoryEnrollmentStore {
    let store = InMemoryEnrollmentStore::default();
    for course in catalog() {
        store.insert_course(course).expect("seed course");
    }
    for student in roster() {
        store.insert_student(student).expect("seed student");
    }
    store
}

pub(super) fn coordinator_over<R>(
    store: Arc<R>,
    config: PolicyConfig,
) -> (EnrollmentCoordinator<R>, Arc<RecordingSubscriber>)
where
    R: EnrollmentRepository + 'static,
{
    let coordinator = EnrollmentCoordinator::with_clock(store, config, Arc::new(FixedClock(now())));
    let recorder = Arc::new(RecordingSubscriber::default());
    coordinator.register_subscriber(recorder.clone());
    (coordinator, recorder)
}

pub(super) fn build_coordinator() -> (
    EnrollmentCoordinator<InMemoryEnrollmentStore>,
    Arc<InMemoryEnrollmentStore>,
    Arc<RecordingSubscriber>,
) {
    build_coordinator_with(PolicyConfig::default())
}

pub(super) fn build_coordinator_with(
    config: PolicyConfig,
) -> (
    EnrollmentCoordinator<InMemoryEnrollmentStore>,
    Arc<InMemoryEnrollmentStore>,
    Arc<RecordingSubscriber>,
) {
    let store = Arc::new(seeded_store());
    let (coordinator, recorder) = coordinator_over(store.clone(), config);
    (coordinator, store, recorder)
}

pub(super) fn standing(store: &InMemoryEnrollmentStore, student_id: StudentId) -> StudentStanding {
    store
        .transaction(|scope| scope.standing(student_id))
        .expect("standing loads")
}

pub(super) fn waitlist(store: &InMemoryEnrollmentStore, course_id: CourseId) -> Vec<StudentId> {
    store
        .transaction(|scope| scope.waitlist(course_id))
        .expect("waitlist loads")
        .students()
}

pub(super) fn active(store: &InMemoryEnrollmentStore, course_id: CourseId) -> u32 {
    store
        .transaction(|scope| scope.count_active_enrollments(course_id))
        .expect("count loads")
}

/// Checks the invariants every committed state must hold.
pub(super) fn assert_consistent(store: &InMemoryEnrollmentStore) {
    store
        .transaction(|scope| -> Result<(), RepositoryError> {
            for course in scope.courses()? {
                let active = scope.count_active_enrollments(course.id)?;
                if let Some(max) = course.max_enrollment {
                    assert!(active <= max, "{} holds {active} of {max} seats", course.name);
                }
                let queue = scope.waitlist(course.id)?;
                if !queue.is_empty() {
                    assert!(
                        course.is_full(active),
                        "{} has a waitlist while seats are free",
                        course.name
                    );
                }
            }
            for student in scope.students()? {
                assert!(
                    scope.standing(student.id)?.is_disjoint(),
                    "student {} holds overlapping states",
                    student.id
                );
            }
            Ok(())
        })
        .expect("consistency check reads store");
}

#[derive(Default)]
pub(super) struct RecordingSubscriber {
    events: Mutex<Vec<EnrollmentEvent>>,
}

impl RecordingSubscriber {
    pub(super) fn events(&self) -> Vec<EnrollmentEvent> {
        self.events.lock().expect("recorder mutex poisoned").clone()
    }

    pub(super) fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(EnrollmentEvent::kind).collect()
    }

    pub(super) fn clear(&self) {
        self.events.lock().expect("recorder mutex poisoned").clear();
    }
}

impl EventSubscriber for RecordingSubscriber {
    fn on_event(&self, event: &EnrollmentEvent) {
        self.events
            .lock()
            .expect("recorder mutex poisoned")
            .push(event.clone());
    }
}

/// Store whose transactions always fail before doing any work.
pub(super) struct UnavailableStore;

impl EnrollmentRepository for UnavailableStore {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EnrollmentScope) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(E::from(RepositoryError::Unavailable(
            "database offline".to_string(),
        )))
    }
}

/// Wraps the in-memory store and, once armed, fails every `upsert_enrollment` call.
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryEnrollmentStore,
    armed: AtomicBool,
}

impl FlakyStore {
    pub(super) fn seeded() -> Self {
        Self {
            inner: seeded_store(),
            armed: AtomicBool::new(false),
        }
    }

    pub(super) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl EnrollmentRepository for FlakyStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EnrollmentScope) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let armed = self.armed.load(Ordering::SeqCst);
        self.inner.transaction(|scope| {
            let mut flaky = FlakyScope { inner: scope, armed };
            work(&mut flaky)
        })
    }
}

struct FlakyScope<'a> {
    inner: &'a mut dyn EnrollmentScope,
    armed: bool,
}

impl EnrollmentScope for FlakyScope<'_> {
    fn student(&self, id: StudentId) -> Result<Option<Student>, RepositoryError> {
        self.inner.student(id)
    }

    fn course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError> {
        self.inner.course(id)
    }

    fn students(&self) -> Result<Vec<Student>, RepositoryError> {
        self.inner.students()
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        self.inner.courses()
    }

    fn save_student(&mut self, student: Student) -> Result<(), RepositoryError> {
        self.inner.save_student(student)
    }

    fn save_course(&mut self, course: Course) -> Result<(), RepositoryError> {
        self.inner.save_course(course)
    }

    fn email_taken(&self, email: &str) -> Result<bool, RepositoryError> {
        self.inner.email_taken(email)
    }

    fn course_name_taken(&self, name: &str) -> Result<bool, RepositoryError> {
        self.inner.course_name_taken(name)
    }

    fn upsert_enrollment(&mut self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        if self.armed {
            return Err(RepositoryError::Unavailable("write rejected".to_string()));
        }
        self.inner.upsert_enrollment(enrollment)
    }

    fn delete_enrollment(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<bool, RepositoryError> {
        self.inner.delete_enrollment(student_id, course_id)
    }

    fn find_active_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.inner.find_active_enrollment(student_id, course_id)
    }

    fn count_active_enrollments(&self, course_id: CourseId) -> Result<u32, RepositoryError> {
        self.inner.count_active_enrollments(course_id)
    }

    fn enrollments_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_course(course_id)
    }

    fn enrollments_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.inner.enrollments_for_student(student_id)
    }

    fn append_waitlist(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
        joined_at: DateTime<Utc>,
    ) -> Result<WaitlistEntry, RepositoryError> {
        self.inner.append_waitlist(student_id, course_id, joined_at)
    }

    fn remove_waitlist_entry(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<bool, RepositoryError> {
        self.inner.remove_waitlist_entry(student_id, course_id)
    }

    fn waitlist(&self, course_id: CourseId) -> Result<WaitlistQueue, RepositoryError> {
        self.inner.waitlist(course_id)
    }

    fn record_completion(&mut self, completion: Completion) -> Result<(), RepositoryError> {
        self.inner.record_completion(completion)
    }

    fn remove_completion(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Completion>, RepositoryError> {
        self.inner.remove_completion(student_id, course_id)
    }

    fn standing(&self, student_id: StudentId) -> Result<StudentStanding, RepositoryError> {
        self.inner.standing(student_id)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
