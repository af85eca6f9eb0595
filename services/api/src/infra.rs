use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use course_enrollment::enrollment::{
    Clock, Course, CourseId, EnrollmentCoordinator, EnrollmentEvent, EnrollmentWindow,
    EventSubscriber, InMemoryEnrollmentStore, LogSubscriber, PolicyConfig, RepositoryError,
    Student, StudentId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type Coordinator = EnrollmentCoordinator<InMemoryEnrollmentStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const INTRO_PROGRAMMING: CourseId = CourseId(101);
pub(crate) const DATA_STRUCTURES: CourseId = CourseId(102);
pub(crate) const TECHNICAL_WRITING: CourseId = CourseId(150);
pub(crate) const OPERATING_SYSTEMS: CourseId = CourseId(201);
pub(crate) const CAPSTONE: CourseId = CourseId(301);

/// Courses served by the demo deployment.
pub(crate) fn demo_catalog() -> Vec<Course> {
    let mut intro = Course::new(INTRO_PROGRAMMING, "Intro to Programming").with_capacity(2);
    intro.description = Some("Variables, control flow and functions.".to_string());

    let mut capstone = Course::new(CAPSTONE, "Capstone Seminar").with_capacity(12);
    let window = NaiveDate::from_ymd_opt(2025, 8, 25).zip(NaiveDate::from_ymd_opt(2025, 9, 12));
    if let Some((opens, closes)) = window {
        capstone = capstone.with_window(EnrollmentWindow { opens, closes });
    }

    vec![
        intro,
        Course::new(DATA_STRUCTURES, "Data Structures")
            .with_capacity(2)
            .with_prerequisite(INTRO_PROGRAMMING),
        Course::new(TECHNICAL_WRITING, "Technical Writing"),
        Course::new(OPERATING_SYSTEMS, "Operating Systems")
            .with_capacity(1)
            .with_prerequisite(DATA_STRUCTURES),
        capstone,
    ]
}

pub(crate) fn demo_students() -> Vec<Student> {
    let registered = Utc::now();
    [
        (1, "Priya Raman", "priya.raman@example.edu"),
        (2, "Mateo Alvarez", "mateo.alvarez@example.edu"),
        (3, "Hannah Okafor", "hannah.okafor@example.edu"),
        (4, "Jonas Lindqvist", "jonas.lindqvist@example.edu"),
        (5, "Mei Tanaka", "mei.tanaka@example.edu"),
        (6, "Samuel Adeyemi", "samuel.adeyemi@example.edu"),
    ]
    .into_iter()
    .map(|(id, name, email)| Student {
        id: StudentId(id),
        name: name.to_string(),
        email: email.to_string(),
        enrolled_on: registered,
    })
    .collect()
}

pub(crate) fn catalog_store() -> Result<InMemoryEnrollmentStore, RepositoryError> {
    let store = InMemoryEnrollmentStore::default();
    for course in demo_catalog() {
        store.insert_course(course)?;
    }
    for student in demo_students() {
        store.insert_student(student)?;
    }
    Ok(store)
}

/// Wires the coordinator with the log and metrics subscribers every deployment carries.
pub(crate) fn build_coordinator(
    store: Arc<InMemoryEnrollmentStore>,
    policy: PolicyConfig,
    clock: Option<Arc<dyn Clock>>,
) -> Coordinator {
    let coordinator = match clock {
        Some(clock) => EnrollmentCoordinator::with_clock(store, policy, clock),
        None => EnrollmentCoordinator::new(store, policy),
    };
    coordinator.register_subscriber(Arc::new(LogSubscriber));
    coordinator.register_subscriber(Arc::new(MetricsSubscriber));
    coordinator
}

/// Counts domain events through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct MetricsSubscriber;

impl EventSubscriber for MetricsSubscriber {
    fn on_event(&self, event: &EnrollmentEvent) {
        match event {
            EnrollmentEvent::Enrolled { .. } => metrics::counter!("app.enrollments").increment(1),
            EnrollmentEvent::Waitlisted { .. } => metrics::counter!("app.waitlisted").increment(1),
            EnrollmentEvent::Unenrolled { .. } => {
                metrics::counter!("app.unenrollments").increment(1)
            }
            EnrollmentEvent::Promoted { .. } => metrics::counter!("app.promotions").increment(1),
            EnrollmentEvent::Completed { .. } => metrics::counter!("app.completions").increment(1),
            EnrollmentEvent::Withdrawn { .. } => metrics::counter!("app.withdrawals").increment(1),
            EnrollmentEvent::Rejected { reason, .. } => {
                metrics::counter!("app.rejections", "reason" => reason.code()).increment(1)
            }
        }
    }
}

/// Pins "now" to noon UTC on a chosen day.
pub(crate) struct CalendarClock(pub(crate) NaiveDate);

impl Clock for CalendarClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::hours(12)
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_enrollment::enrollment::EnrollmentOutcome;

    #[test]
    fn catalog_store_seeds_every_course_and_student() {
        let store = Arc::new(catalog_store().expect("catalog seeds"));
        let coordinator = build_coordinator(store, PolicyConfig::default(), None);

        for course in demo_catalog() {
            let roster = coordinator.course_roster(course.id).expect("roster");
            assert!(roster.enrolled.is_empty());
        }
        let page = coordinator
            .search_students(&Default::default())
            .expect("search");
        assert_eq!(page.total_elements, demo_students().len());
    }

    #[test]
    fn calendar_clock_drives_the_enrollment_window() {
        let store = Arc::new(catalog_store().expect("catalog seeds"));
        let open_day = parse_date("2025-09-01").expect("date");
        let coordinator = build_coordinator(
            store,
            PolicyConfig::default(),
            Some(Arc::new(CalendarClock(open_day))),
        );

        assert_eq!(
            coordinator.enroll(StudentId(1), CAPSTONE).expect("window open"),
            EnrollmentOutcome::Enrolled
        );
    }

    #[test]
    fn parse_date_reports_bad_input() {
        let err = parse_date("09/01/2025").expect_err("not iso");
        assert!(err.contains("09/01/2025"));
    }
}
