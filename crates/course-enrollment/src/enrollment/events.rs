use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::capacity::RejectionReason;
use super::domain::{CourseId, StudentId};

const EVENT_STREAM_CAPACITY: usize = 256;

/// Domain event emitted after a coordinator operation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EnrollmentEvent {
    Enrolled {
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    },
    Waitlisted {
        student_id: StudentId,
        course_id: CourseId,
        position: usize,
        at: DateTime<Utc>,
    },
    Unenrolled {
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    },
    Promoted {
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    },
    Completed {
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    },
    Withdrawn {
        student_id: StudentId,
        course_id: CourseId,
        at: DateTime<Utc>,
    },
    Rejected {
        student_id: StudentId,
        course_id: CourseId,
        reason: RejectionReason,
        at: DateTime<Utc>,
    },
}

impl EnrollmentEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Enrolled { .. } => "enrolled",
            Self::Waitlisted { .. } => "waitlisted",
            Self::Unenrolled { .. } => "unenrolled",
            Self::Promoted { .. } => "promoted",
            Self::Completed { .. } => "completed",
            Self::Withdrawn { .. } => "withdrawn",
            Self::Rejected { .. } => "rejected",
        }
    }

    pub fn pair(&self) -> (StudentId, CourseId) {
        match self {
            Self::Enrolled {
                student_id,
                course_id,
                ..
            }
            | Self::Waitlisted {
                student_id,
                course_id,
                ..
            }
            | Self::Unenrolled {
                student_id,
                course_id,
                ..
            }
            | Self::Promoted {
                student_id,
                course_id,
                ..
            }
            | Self::Completed {
                student_id,
                course_id,
                ..
            }
            | Self::Withdrawn {
                student_id,
                course_id,
                ..
            }
            | Self::Rejected {
                student_id,
                course_id,
                ..
            } => (*student_id, *course_id),
        }
    }
}

/// Observer hook for metrics, audit logs and similar collaborators.
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &EnrollmentEvent);
}

/// Fans events out to registered subscribers and to any broadcast receivers.
pub struct EventHub {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    stream: broadcast::Sender<EnrollmentEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        let (stream, _) = broadcast::channel(EVENT_STREAM_CAPACITY);
        Self {
            subscribers: RwLock::new(Vec::new()),
            stream,
        }
    }
}

impl EventHub {
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) {
        let mut guard = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(subscriber);
    }

    /// Receiver for events published from now on. Slow receivers observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<EnrollmentEvent> {
        self.stream.subscribe()
    }

    pub fn publish(&self, event: EnrollmentEvent) {
        // Snapshot the list so a subscriber can publish or register from `on_event`.
        let subscribers = match self.subscribers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for subscriber in &subscribers {
            subscriber.on_event(&event);
        }
        // No receivers is not an error.
        let _ = self.stream.send(event);
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = EnrollmentEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Writes every event to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSubscriber;

impl EventSubscriber for LogSubscriber {
    fn on_event(&self, event: &EnrollmentEvent) {
        let (student_id, course_id) = event.pair();
        match event {
            EnrollmentEvent::Rejected { reason, .. } => warn!(
                %student_id,
                %course_id,
                reason = reason.code(),
                "enrollment request rejected"
            ),
            EnrollmentEvent::Waitlisted { position, .. } => info!(
                %student_id,
                %course_id,
                position,
                "student waitlisted"
            ),
            other => info!(%student_id, %course_id, event = other.kind(), "enrollment event"),
        }
    }
}
