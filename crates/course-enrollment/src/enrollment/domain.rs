use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub u64);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub u64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrollmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub enrolled_on: DateTime<Utc>,
}

/// Inclusive date range during which new enrollment requests are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentWindow {
    pub opens: NaiveDate,
    pub closes: NaiveDate,
}

impl EnrollmentWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.opens <= date && date <= self.closes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` means the course has no seat limit.
    #[serde(default)]
    pub max_enrollment: Option<u32>,
    #[serde(default)]
    pub prerequisites: BTreeSet<CourseId>,
    #[serde(default)]
    pub enrollment_window: Option<EnrollmentWindow>,
}

impl Course {
    pub fn new(id: CourseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            max_enrollment: None,
            prerequisites: BTreeSet::new(),
            enrollment_window: None,
        }
    }

    pub fn with_capacity(mut self, max_enrollment: u32) -> Self {
        self.max_enrollment = Some(max_enrollment);
        self
    }

    pub fn with_prerequisite(mut self, prerequisite: CourseId) -> Self {
        self.prerequisites.insert(prerequisite);
        self
    }

    pub fn with_window(mut self, window: EnrollmentWindow) -> Self {
        self.enrollment_window = Some(window);
        self
    }

    pub fn is_full(&self, active_enrollments: u32) -> bool {
        self.max_enrollment
            .map(|max| active_enrollments >= max)
            .unwrap_or(false)
    }

    pub fn seats_remaining(&self, active_enrollments: u32) -> Option<u32> {
        self.max_enrollment
            .map(|max| max.saturating_sub(active_enrollments))
    }
}

/// Active link between a student and a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub created_at: DateTime<Utc>,
    /// Completion time held while the student retakes the course. Restored on unenroll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previously_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub joined_at: DateTime<Utc>,
    /// Assigned by the store on append; strictly increasing, so FIFO order has no ties.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub student_id: StudentId,
    pub course_id: CourseId,
    pub completed_at: DateTime<Utc>,
}

/// Lifecycle state of a single (student, course) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    None,
    Enrolled,
    Waitlisted,
    Completed,
}

impl PairState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Enrolled => "enrolled",
            Self::Waitlisted => "waitlisted",
            Self::Completed => "completed",
        }
    }
}

/// Per-student view of enrollment state, derived from the stored link records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentStanding {
    pub enrolled: BTreeSet<CourseId>,
    pub waitlisted: BTreeSet<CourseId>,
    pub completed: BTreeSet<CourseId>,
    /// Enrolled courses the student already completed once. Still count as prerequisites.
    #[serde(default)]
    pub retaking: BTreeSet<CourseId>,
}

impl StudentStanding {
    pub fn state_for(&self, course_id: CourseId) -> PairState {
        if self.enrolled.contains(&course_id) {
            PairState::Enrolled
        } else if self.waitlisted.contains(&course_id) {
            PairState::Waitlisted
        } else if self.completed.contains(&course_id) {
            PairState::Completed
        } else {
            PairState::None
        }
    }

    /// Prerequisites of `course` that are not yet completed, in ascending id order.
    pub fn missing_prerequisites(&self, course: &Course) -> Vec<CourseId> {
        course
            .prerequisites
            .iter()
            .filter(|id| !self.completed.contains(id) && !self.retaking.contains(id))
            .copied()
            .collect()
    }

    pub fn is_disjoint(&self) -> bool {
        self.enrolled.is_disjoint(&self.waitlisted)
            && self.enrolled.is_disjoint(&self.completed)
            && self.waitlisted.is_disjoint(&self.completed)
    }
}

/// Outcome of a successful `enroll` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrollmentOutcome {
    Enrolled,
    /// `position` is 1-based.
    Waitlisted { position: usize },
}

impl EnrollmentOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::Waitlisted { .. } => "waitlisted",
        }
    }
}

/// Result of freeing a seat through unenroll or completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRelease {
    pub promoted: Option<StudentId>,
}

pub(crate) fn course_names(
    courses: &BTreeMap<CourseId, Course>,
    ids: &BTreeSet<CourseId>,
) -> BTreeSet<String> {
    ids.iter()
        .filter_map(|id| courses.get(id).map(|course| course.name.clone()))
        .collect()
}
