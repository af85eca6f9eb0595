use serde::Serialize;

use super::domain::{CourseId, StudentId, WaitlistEntry};

/// FIFO waitlist for one course, materialized from stored entries.
///
/// Entries are ordered by their store-assigned sequence, which follows join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistQueue {
    course_id: CourseId,
    entries: Vec<WaitlistEntry>,
}

impl WaitlistQueue {
    pub fn from_entries(course_id: CourseId, entries: impl IntoIterator<Item = WaitlistEntry>) -> Self {
        let mut entries: Vec<_> = entries
            .into_iter()
            .filter(|entry| entry.course_id == course_id)
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        Self { course_id, entries }
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn head(&self) -> Option<&WaitlistEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, student_id: StudentId) -> bool {
        self.entries.iter().any(|entry| entry.student_id == student_id)
    }

    /// 1-based position of the student, if queued.
    pub fn position_of(&self, student_id: StudentId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.student_id == student_id)
            .map(|index| index + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitlistEntry> {
        self.entries.iter()
    }

    pub fn students(&self) -> Vec<StudentId> {
        self.entries.iter().map(|entry| entry.student_id).collect()
    }
}
