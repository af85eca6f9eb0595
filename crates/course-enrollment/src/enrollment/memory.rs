use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{
    Completion, Course, CourseId, Enrollment, Student, StudentId, StudentStanding, WaitlistEntry,
};
use super::repository::{EnrollmentRepository, EnrollmentScope, RepositoryError};
use super::waitlist::WaitlistQueue;

type PairKey = (StudentId, CourseId);

#[derive(Debug, Clone, Default)]
struct StoreState {
    students: BTreeMap<StudentId, Student>,
    courses: BTreeMap<CourseId, Course>,
    enrollments: BTreeMap<PairKey, Enrollment>,
    waitlist: BTreeMap<PairKey, WaitlistEntry>,
    completions: BTreeMap<PairKey, Completion>,
}

#[derive(Debug, Clone)]
enum Mutation {
    SaveStudent(Student),
    SaveCourse(Course),
    UpsertEnrollment(Enrollment),
    DeleteEnrollment(PairKey),
    AppendWaitlist(WaitlistEntry),
    RemoveWaitlist(PairKey),
    RecordCompletion(Completion),
    RemoveCompletion(PairKey),
}

impl StoreState {
    /// Unique emails and course names, checked again against committed state.
    fn conflicts_with(&self, mutation: &Mutation) -> bool {
        match mutation {
            Mutation::SaveStudent(student) => self.students.values().any(|other| {
                other.id != student.id && other.email.eq_ignore_ascii_case(&student.email)
            }),
            Mutation::SaveCourse(course) => self
                .courses
                .values()
                .any(|other| other.id != course.id && other.name == course.name),
            _ => false,
        }
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::SaveStudent(student) => {
                self.students.insert(student.id, student);
            }
            Mutation::SaveCourse(course) => {
                self.courses.insert(course.id, course);
            }
            Mutation::UpsertEnrollment(enrollment) => {
                self.enrollments
                    .insert((enrollment.student_id, enrollment.course_id), enrollment);
            }
            Mutation::DeleteEnrollment(key) => {
                self.enrollments.remove(&key);
            }
            Mutation::AppendWaitlist(entry) => {
                self.waitlist
                    .insert((entry.student_id, entry.course_id), entry);
            }
            Mutation::RemoveWaitlist(key) => {
                self.waitlist.remove(&key);
            }
            Mutation::RecordCompletion(completion) => {
                self.completions
                    .insert((completion.student_id, completion.course_id), completion);
            }
            Mutation::RemoveCompletion(key) => {
                self.completions.remove(&key);
            }
        }
    }
}

/// Process-local store backing the demo service and the test suites.
///
/// A transaction works on a snapshot and records a journal of mutations. The journal is
/// replayed onto the shared state only when the work succeeds, so a failed operation leaves
/// nothing behind. Callers are expected to serialize writers per course.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEnrollmentStore {
    state: Arc<Mutex<StoreState>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryEnrollmentStore {
    pub fn insert_student(&self, student: Student) -> Result<(), RepositoryError> {
        self.transaction(|scope| scope.save_student(student))
    }

    pub fn insert_course(&self, course: Course) -> Result<(), RepositoryError> {
        self.transaction(|scope| scope.save_course(course))
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl EnrollmentRepository for InMemoryEnrollmentStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EnrollmentScope) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let snapshot = self.lock()?.clone();
        let mut scope = MemoryScope {
            working: snapshot,
            journal: Vec::new(),
            sequence: &self.sequence,
        };

        let value = work(&mut scope)?;

        if !scope.journal.is_empty() {
            let mut shared = self.lock()?;
            if scope.journal.iter().any(|mutation| shared.conflicts_with(mutation)) {
                debug!("unique key taken by a concurrent commit");
                return Err(RepositoryError::Conflict.into());
            }
            debug!(mutations = scope.journal.len(), "committing enrollment scope");
            for mutation in scope.journal {
                shared.apply(mutation);
            }
        }
        Ok(value)
    }
}

struct MemoryScope<'a> {
    working: StoreState,
    journal: Vec<Mutation>,
    sequence: &'a AtomicU64,
}

impl MemoryScope<'_> {
    fn record(&mut self, mutation: Mutation) {
        self.working.apply(mutation.clone());
        self.journal.push(mutation);
    }
}

impl EnrollmentScope for MemoryScope<'_> {
    fn student(&self, id: StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self.working.students.get(&id).cloned())
    }

    fn course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.working.courses.get(&id).cloned())
    }

    fn students(&self) -> Result<Vec<Student>, RepositoryError> {
        Ok(self.working.students.values().cloned().collect())
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.working.courses.values().cloned().collect())
    }

    fn save_student(&mut self, student: Student) -> Result<(), RepositoryError> {
        let mutation = Mutation::SaveStudent(student);
        if self.working.conflicts_with(&mutation) {
            return Err(RepositoryError::Conflict);
        }
        self.record(mutation);
        Ok(())
    }

    fn save_course(&mut self, course: Course) -> Result<(), RepositoryError> {
        let mutation = Mutation::SaveCourse(course);
        if self.working.conflicts_with(&mutation) {
            return Err(RepositoryError::Conflict);
        }
        self.record(mutation);
        Ok(())
    }

    fn email_taken(&self, email: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .working
            .students
            .values()
            .any(|student| student.email.eq_ignore_ascii_case(email)))
    }

    fn course_name_taken(&self, name: &str) -> Result<bool, RepositoryError> {
        Ok(self.working.courses.values().any(|course| course.name == name))
    }

    fn upsert_enrollment(&mut self, enrollment: Enrollment) -> Result<(), RepositoryError> {
        self.record(Mutation::UpsertEnrollment(enrollment));
        Ok(())
    }

    fn delete_enrollment(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<bool, RepositoryError> {
        let key = (student_id, course_id);
        if !self.working.enrollments.contains_key(&key) {
            return Ok(false);
        }
        self.record(Mutation::DeleteEnrollment(key));
        Ok(true)
    }

    fn find_active_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self.working.enrollments.get(&(student_id, course_id)).cloned())
    }

    fn count_active_enrollments(&self, course_id: CourseId) -> Result<u32, RepositoryError> {
        let count = self
            .working
            .enrollments
            .keys()
            .filter(|(_, course)| *course == course_id)
            .count();
        u32::try_from(count).map_err(|_| RepositoryError::Unavailable("count overflow".to_string()))
    }

    fn enrollments_for_course(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut enrollments: Vec<_> = self
            .working
            .enrollments
            .values()
            .filter(|enrollment| enrollment.course_id == course_id)
            .cloned()
            .collect();
        enrollments.sort_by_key(|enrollment| enrollment.created_at);
        Ok(enrollments)
    }

    fn enrollments_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        Ok(self
            .working
            .enrollments
            .range((student_id, CourseId(0))..=(student_id, CourseId(u64::MAX)))
            .map(|(_, enrollment)| enrollment.clone())
            .collect())
    }

    fn append_waitlist(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
        joined_at: DateTime<Utc>,
    ) -> Result<WaitlistEntry, RepositoryError> {
        if self.working.waitlist.contains_key(&(student_id, course_id)) {
            return Err(RepositoryError::Conflict);
        }
        let entry = WaitlistEntry {
            student_id,
            course_id,
            joined_at,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.record(Mutation::AppendWaitlist(entry.clone()));
        Ok(entry)
    }

    fn remove_waitlist_entry(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<bool, RepositoryError> {
        let key = (student_id, course_id);
        if !self.working.waitlist.contains_key(&key) {
            return Ok(false);
        }
        self.record(Mutation::RemoveWaitlist(key));
        Ok(true)
    }

    fn waitlist(&self, course_id: CourseId) -> Result<WaitlistQueue, RepositoryError> {
        Ok(WaitlistQueue::from_entries(
            course_id,
            self.working.waitlist.values().cloned(),
        ))
    }

    fn record_completion(&mut self, completion: Completion) -> Result<(), RepositoryError> {
        self.record(Mutation::RecordCompletion(completion));
        Ok(())
    }

    fn remove_completion(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Completion>, RepositoryError> {
        let key = (student_id, course_id);
        let Some(completion) = self.working.completions.get(&key).cloned() else {
            return Ok(None);
        };
        self.record(Mutation::RemoveCompletion(key));
        Ok(Some(completion))
    }

    fn standing(&self, student_id: StudentId) -> Result<StudentStanding, RepositoryError> {
        Ok(StudentStanding {
            enrolled: courses_of(&self.working.enrollments, student_id),
            waitlisted: courses_of(&self.working.waitlist, student_id),
            completed: courses_of(&self.working.completions, student_id),
            retaking: self
                .working
                .enrollments
                .range((student_id, CourseId(0))..=(student_id, CourseId(u64::MAX)))
                .filter(|(_, enrollment)| enrollment.previously_completed_at.is_some())
                .map(|((_, course), _)| *course)
                .collect(),
        })
    }
}

fn courses_of<V>(records: &BTreeMap<PairKey, V>, student_id: StudentId) -> BTreeSet<CourseId> {
    records
        .range((student_id, CourseId(0))..=(student_id, CourseId(u64::MAX)))
        .map(|((_, course), _)| *course)
        .collect()
}
