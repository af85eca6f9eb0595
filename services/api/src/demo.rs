use crate::infra::{
    build_coordinator, catalog_store, demo_catalog, CalendarClock, Coordinator, CAPSTONE,
    DATA_STRUCTURES, INTRO_PROGRAMMING, OPERATING_SYSTEMS, TECHNICAL_WRITING,
};
use chrono::NaiveDate;
use clap::Args;
use course_enrollment::enrollment::{
    Clock, CoordinatorError, CourseId, CourseRosterView, EnrollmentOutcome, PolicyConfig,
    StudentId,
};
use course_enrollment::error::AppError;
use std::io;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Pretend the demo runs on this day (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Permit students to re-enroll in courses they already completed.
    #[arg(long)]
    pub(crate) allow_retake: bool,
    /// Print every committed domain event as JSON after the walkthrough.
    #[arg(long)]
    pub(crate) show_events: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RosterArgs {
    /// Course id from the demo catalog.
    #[arg(long)]
    pub(crate) course: u64,
    /// Export the bare catalog without replaying the demo activity first.
    #[arg(long)]
    pub(crate) skip_activity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Enroll(u64, CourseId),
    Unenroll(u64, CourseId),
    Complete(u64, CourseId),
    Withdraw(u64, CourseId),
    Promote(CourseId),
}

/// The registration-week walkthrough shared by `demo` and `roster`.
pub(crate) fn scripted_activity() -> Vec<Step> {
    use Step::*;
    vec![
        Enroll(1, INTRO_PROGRAMMING),
        Enroll(2, INTRO_PROGRAMMING),
        Enroll(3, INTRO_PROGRAMMING),
        Enroll(4, INTRO_PROGRAMMING),
        Enroll(1, INTRO_PROGRAMMING),
        Enroll(1, DATA_STRUCTURES),
        Complete(1, INTRO_PROGRAMMING),
        Enroll(1, DATA_STRUCTURES),
        Enroll(5, INTRO_PROGRAMMING),
        Withdraw(4, INTRO_PROGRAMMING),
        Unenroll(2, INTRO_PROGRAMMING),
        Enroll(5, TECHNICAL_WRITING),
        Enroll(6, CAPSTONE),
        Promote(INTRO_PROGRAMMING),
        Enroll(1, OPERATING_SYSTEMS),
    ]
}

/// Applies one step. Policy rejections are reported as text; other failures abort.
pub(crate) fn apply(coordinator: &Coordinator, step: Step) -> Result<String, CoordinatorError> {
    let result = match step {
        Step::Enroll(student, course) => coordinator
            .enroll(StudentId(student), course)
            .map(|outcome| match outcome {
                EnrollmentOutcome::Enrolled => "enrolled".to_string(),
                EnrollmentOutcome::Waitlisted { position } => {
                    format!("waitlisted at position {position}")
                }
            }),
        Step::Unenroll(student, course) => coordinator
            .unenroll(StudentId(student), course)
            .map(|release| promoted_label(release.promoted)),
        Step::Complete(student, course) => coordinator
            .complete_course(StudentId(student), course)
            .map(|release| format!("completed, {}", promoted_label(release.promoted))),
        Step::Withdraw(student, course) => coordinator
            .withdraw(StudentId(student), course)
            .map(|()| "left the waitlist".to_string()),
        Step::Promote(course) => coordinator.promote(course).map(promoted_label),
    };

    match result {
        Err(CoordinatorError::Rejected(reason)) => Ok(format!("rejected ({reason})")),
        other => other,
    }
}

fn promoted_label(promoted: Option<StudentId>) -> String {
    match promoted {
        Some(student) => format!("seat passed to student {student}"),
        None => "no promotion".to_string(),
    }
}

fn describe(step: Step) -> String {
    match step {
        Step::Enroll(student, course) => format!("student {student} requests course {course}"),
        Step::Unenroll(student, course) => format!("student {student} drops course {course}"),
        Step::Complete(student, course) => format!("student {student} completes course {course}"),
        Step::Withdraw(student, course) => {
            format!("student {student} withdraws from the course {course} waitlist")
        }
        Step::Promote(course) => format!("registrar promotes from the course {course} waitlist"),
    }
}

fn demo_coordinator(today: Option<NaiveDate>, allow_retake: bool) -> Result<Coordinator, AppError> {
    let store = catalog_store().map_err(CoordinatorError::from)?;
    let clock = today.map(|day| Arc::new(CalendarClock(day)) as Arc<dyn Clock>);
    Ok(build_coordinator(
        Arc::new(store),
        PolicyConfig { allow_retake },
        clock,
    ))
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let coordinator = demo_coordinator(args.today, args.allow_retake)?;
    let mut events = coordinator.subscribe();

    println!("Course enrollment walkthrough");
    println!("=============================");
    for (index, step) in scripted_activity().into_iter().enumerate() {
        let outcome = apply(&coordinator, step)?;
        println!("{:>2}. {:<58} -> {outcome}", index + 1, describe(step));
    }

    println!();
    println!("Final rosters");
    println!("-------------");
    for course in demo_catalog() {
        let roster = coordinator.course_roster(course.id)?;
        print_roster(&roster);
    }

    if args.show_events {
        println!();
        println!("Committed events");
        println!("----------------");
        while let Ok(event) = events.try_recv() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => println!("<unserializable event: {err}>"),
            }
        }
    }

    Ok(())
}

fn print_roster(roster: &CourseRosterView) {
    let capacity = roster
        .max_enrollment
        .map(|max| max.to_string())
        .unwrap_or_else(|| "unlimited".to_string());
    println!(
        "{} [{}] seats {}/{}",
        roster.name,
        roster.course_id,
        roster.enrolled.len(),
        capacity
    );
    println!("  enrolled: {}", join(&roster.enrolled));
    if !roster.waitlist.is_empty() {
        println!("  waitlist: {}", join(&roster.waitlist));
    }
}

fn join(students: &[StudentId]) -> String {
    if students.is_empty() {
        return "-".to_string();
    }
    students
        .iter()
        .map(StudentId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn run_roster_export(args: RosterArgs) -> Result<(), AppError> {
    let coordinator = demo_coordinator(None, false)?;
    if !args.skip_activity {
        for step in scripted_activity() {
            apply(&coordinator, step)?;
        }
    }

    let roster = coordinator.course_roster(CourseId(args.course))?;
    roster.write_csv(io::stdout().lock())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_day() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2025, 9, 1)
    }

    #[test]
    fn scripted_activity_ends_in_a_consistent_catalog() {
        let coordinator = demo_coordinator(fixed_day(), false).expect("coordinator");
        let outcomes: Vec<_> = scripted_activity()
            .into_iter()
            .map(|step| apply(&coordinator, step).expect("step applies"))
            .collect();

        assert_eq!(outcomes[2], "waitlisted at position 1");
        assert!(outcomes[4].starts_with("rejected"));
        assert!(outcomes[5].starts_with("rejected (prerequisites not met"));
        assert_eq!(outcomes[6], "completed, seat passed to student 3");
        assert_eq!(outcomes[7], "enrolled");

        let intro = coordinator
            .course_roster(INTRO_PROGRAMMING)
            .expect("roster");
        assert_eq!(intro.enrolled, vec![StudentId(3), StudentId(5)]);
        assert!(intro.waitlist.is_empty());

        let capstone = coordinator.course_roster(CAPSTONE).expect("roster");
        assert_eq!(capstone.enrolled, vec![StudentId(6)]);
    }

    #[test]
    fn closed_window_is_reported_not_fatal() {
        let late = NaiveDate::from_ymd_opt(2025, 12, 1);
        let coordinator = demo_coordinator(late, false).expect("coordinator");
        let outcome = apply(&coordinator, Step::Enroll(6, CAPSTONE)).expect("step applies");
        assert!(outcome.starts_with("rejected (enrollment is closed"));
    }

    #[test]
    fn unknown_course_aborts_the_step() {
        let coordinator = demo_coordinator(fixed_day(), false).expect("coordinator");
        match apply(&coordinator, Step::Promote(CourseId(999))) {
            Err(CoordinatorError::CourseNotFound(CourseId(999))) => {}
            other => panic!("expected missing course, got {other:?}"),
        }
    }
}
