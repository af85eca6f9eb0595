use super::common::*;

use crate::enrollment::domain::{Course, CourseId, StudentId};
use crate::enrollment::repository::{EnrollmentRepository, RepositoryError};

#[test]
fn store_rejects_duplicate_student_emails() {
    let store = seeded_store();
    let clash = student(StudentId(77), "Ada Again", "ADA@example.edu");
    assert_eq!(store.insert_student(clash), Err(RepositoryError::Conflict));
    let taken = store
        .transaction(|scope| scope.email_taken("ada@example.edu"))
        .expect("lookup");
    assert!(taken);
}

#[test]
fn commit_rechecks_emails_taken_after_the_snapshot() {
    let store = seeded_store();
    let concurrent = store.clone();

    let outcome = store.transaction(|scope| -> Result<(), RepositoryError> {
        assert!(!scope.email_taken("linus@example.edu")?);
        concurrent.insert_student(student(StudentId(70), "Linus", "linus@example.edu"))?;
        scope.save_student(student(StudentId(71), "Linus Again", "LINUS@example.edu"))
    });

    assert_eq!(outcome, Err(RepositoryError::Conflict));
    let holders: Vec<StudentId> = store
        .transaction(|scope| scope.students())
        .expect("students load")
        .into_iter()
        .filter(|s| s.email.eq_ignore_ascii_case("linus@example.edu"))
        .map(|s| s.id)
        .collect();
    assert_eq!(holders, vec![StudentId(70)]);
}

#[test]
fn commit_rechecks_course_names_taken_after_the_snapshot() {
    let store = seeded_store();
    let concurrent = store.clone();

    let outcome = store.transaction(|scope| -> Result<(), RepositoryError> {
        concurrent.insert_course(Course::new(CourseId(50), "Type Theory"))?;
        scope.save_course(Course::new(CourseId(51), "Type Theory"))
    });

    assert_eq!(outcome, Err(RepositoryError::Conflict));
    let courses = store
        .transaction(|scope| scope.courses())
        .expect("courses load");
    assert!(courses.iter().any(|course| course.id == CourseId(50)));
    assert!(courses.iter().all(|course| course.id != CourseId(51)));
}

#[test]
fn resaving_a_record_keeps_its_own_unique_key() {
    let store = seeded_store();
    store
        .insert_student(student(ADA, "Ada King", "ada@example.edu"))
        .expect("rename keeps email");
    store
        .insert_course(Course::new(ALGORITHMS, "Algorithms").with_capacity(5))
        .expect("capacity change keeps name");
    let ada = store
        .transaction(|scope| scope.student(ADA))
        .expect("student loads")
        .expect("ada exists");
    assert_eq!(ada.name, "Ada King");
}
