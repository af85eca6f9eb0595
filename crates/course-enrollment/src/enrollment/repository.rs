use chrono::{DateTime, Utc};

use super::domain::{
    Completion, Course, CourseId, Enrollment, Student, StudentId, StudentStanding, WaitlistEntry,
};
use super::waitlist::WaitlistQueue;

/// Storage abstraction so the coordinator can be exercised in isolation.
///
/// All reads and writes happen inside [`EnrollmentRepository::transaction`]. Implementations
/// must commit every mutation made through the scope when `work` returns `Ok`, and discard all
/// of them when it returns `Err`.
pub trait EnrollmentRepository: Send + Sync {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn EnrollmentScope) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Unit of work handed to [`EnrollmentRepository::transaction`]. Reads observe the scope's
/// own uncommitted writes.
pub trait EnrollmentScope {
    fn student(&self, id: StudentId) -> Result<Option<Student>, RepositoryError>;
    fn course(&self, id: CourseId) -> Result<Option<Course>, RepositoryError>;
    fn students(&self) -> Result<Vec<Student>, RepositoryError>;
    fn courses(&self) -> Result<Vec<Course>, RepositoryError>;

    fn save_student(&mut self, student: Student) -> Result<(), RepositoryError>;
    fn save_course(&mut self, course: Course) -> Result<(), RepositoryError>;
    fn email_taken(&self, email: &str) -> Result<bool, RepositoryError>;
    fn course_name_taken(&self, name: &str) -> Result<bool, RepositoryError>;

    fn upsert_enrollment(&mut self, enrollment: Enrollment) -> Result<(), RepositoryError>;
    /// Returns whether a record was removed.
    fn delete_enrollment(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<bool, RepositoryError>;
    fn find_active_enrollment(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    fn count_active_enrollments(&self, course_id: CourseId) -> Result<u32, RepositoryError>;
    fn enrollments_for_course(&self, course_id: CourseId)
        -> Result<Vec<Enrollment>, RepositoryError>;
    fn enrollments_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Enrollment>, RepositoryError>;

    /// Appends to the tail of the course waitlist, assigning the next sequence number.
    fn append_waitlist(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
        joined_at: DateTime<Utc>,
    ) -> Result<WaitlistEntry, RepositoryError>;
    fn remove_waitlist_entry(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<bool, RepositoryError>;
    fn waitlist(&self, course_id: CourseId) -> Result<WaitlistQueue, RepositoryError>;

    fn record_completion(&mut self, completion: Completion) -> Result<(), RepositoryError>;
    fn remove_completion(
        &mut self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<Completion>, RepositoryError>;
    fn standing(&self, student_id: StudentId) -> Result<StudentStanding, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
