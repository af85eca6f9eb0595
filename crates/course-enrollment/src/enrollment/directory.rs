use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Course, CourseId};
use super::repository::{EnrollmentScope, RepositoryError};
use super::views::StudentView;

const DEFAULT_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Active,
    Waitlisted,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Email,
    Id,
}

/// Filters for browsing the student directory. Empty strings behave like absent filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentQuery {
    /// Case-insensitive substring of the name or email.
    pub keyword: Option<String>,
    /// Course name matched case-insensitively against all membership sets.
    pub course: Option<String>,
    pub status: Option<StatusFilter>,
    pub sort_by: SortKey,
    /// Zero-based.
    pub page: usize,
    pub size: Option<usize>,
}

impl StudentQuery {
    fn page_size(&self) -> usize {
        self.size.filter(|size| *size > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn matches(&self, view: &StudentView) -> bool {
        if let Some(keyword) = non_empty(&self.keyword) {
            let keyword = keyword.to_lowercase();
            if !view.name.to_lowercase().contains(&keyword)
                && !view.email.to_lowercase().contains(&keyword)
            {
                return false;
            }
        }

        if let Some(course) = non_empty(&self.course) {
            let in_course = view
                .enrolled_courses
                .iter()
                .chain(&view.waitlisted_courses)
                .chain(&view.completed_courses)
                .any(|name| name.eq_ignore_ascii_case(course));
            if !in_course {
                return false;
            }
        }

        match self.status {
            Some(StatusFilter::Active) => !view.enrolled_courses.is_empty(),
            Some(StatusFilter::Waitlisted) => !view.waitlisted_courses.is_empty(),
            Some(StatusFilter::Completed) => !view.completed_courses.is_empty(),
            None => true,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
}

pub(crate) fn search_students(
    scope: &dyn EnrollmentScope,
    query: &StudentQuery,
) -> Result<Page<StudentView>, RepositoryError> {
    let courses: BTreeMap<CourseId, Course> = scope
        .courses()?
        .into_iter()
        .map(|course| (course.id, course))
        .collect();

    let mut matches = Vec::new();
    for student in scope.students()? {
        let standing = scope.standing(student.id)?;
        let view = StudentView::project(student, &standing, &courses);
        if query.matches(&view) {
            matches.push(view);
        }
    }

    match query.sort_by {
        SortKey::Name => matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        SortKey::Email => matches.sort_by(|a, b| a.email.cmp(&b.email).then(a.id.cmp(&b.id))),
        SortKey::Id => matches.sort_by_key(|view| view.id),
    }

    let size = query.page_size();
    let total_elements = matches.len();
    let content = matches
        .into_iter()
        .skip(query.page.saturating_mul(size))
        .take(size)
        .collect();

    Ok(Page {
        content,
        page: query.page,
        size,
        total_elements,
        total_pages: total_elements.div_ceil(size),
    })
}
