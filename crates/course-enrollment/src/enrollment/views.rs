use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{course_names, Course, CourseId, Student, StudentId, StudentStanding};
use super::repository::{EnrollmentScope, RepositoryError};

/// Outward-facing projection of a student and their course memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentView {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    pub enrolled_courses: BTreeSet<String>,
    pub waitlisted_courses: BTreeSet<String>,
    pub completed_courses: BTreeSet<String>,
    pub enrollment_date: NaiveDate,
}

impl StudentView {
    pub(crate) fn project(
        student: Student,
        standing: &StudentStanding,
        courses: &BTreeMap<CourseId, Course>,
    ) -> Self {
        Self {
            id: student.id,
            enrollment_date: student.enrolled_on.date_naive(),
            name: student.name,
            email: student.email,
            enrolled_courses: course_names(courses, &standing.enrolled),
            waitlisted_courses: course_names(courses, &standing.waitlisted),
            completed_courses: course_names(courses, &standing.completed),
        }
    }
}

/// Seat usage and queue order for one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseRosterView {
    pub course_id: CourseId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_enrollment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats_remaining: Option<u32>,
    pub enrolled: Vec<StudentId>,
    /// Head of the queue first.
    pub waitlist: Vec<StudentId>,
}

impl CourseRosterView {
    pub(crate) fn load(
        scope: &dyn EnrollmentScope,
        course: Course,
    ) -> Result<Self, RepositoryError> {
        let enrolled: Vec<_> = scope
            .enrollments_for_course(course.id)?
            .into_iter()
            .map(|enrollment| enrollment.student_id)
            .collect();
        let waitlist = scope.waitlist(course.id)?.students();
        let active = u32::try_from(enrolled.len()).unwrap_or(u32::MAX);

        Ok(Self {
            course_id: course.id,
            seats_remaining: course.seats_remaining(active),
            max_enrollment: course.max_enrollment,
            name: course.name,
            enrolled,
            waitlist,
        })
    }

    /// Writes one CSV row per enrolled or waitlisted student.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        for student_id in &self.enrolled {
            csv.serialize(RosterRow {
                course_id: self.course_id,
                course_name: &self.name,
                student_id: *student_id,
                status: "enrolled",
                waitlist_position: None,
            })?;
        }
        for (index, student_id) in self.waitlist.iter().enumerate() {
            csv.serialize(RosterRow {
                course_id: self.course_id,
                course_name: &self.name,
                student_id: *student_id,
                status: "waitlisted",
                waitlist_position: Some(index + 1),
            })?;
        }
        csv.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct RosterRow<'a> {
    course_id: CourseId,
    course_name: &'a str,
    student_id: StudentId,
    status: &'static str,
    waitlist_position: Option<usize>,
}
