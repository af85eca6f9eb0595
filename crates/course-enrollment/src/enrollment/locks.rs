use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::CourseId;

/// Registry of per-course mutexes. Operations on one course are serialized; different
/// courses never contend beyond the short registry lookup.
#[derive(Debug, Default)]
pub(crate) struct CourseLocks {
    registry: Mutex<HashMap<CourseId, Arc<Mutex<()>>>>,
}

impl CourseLocks {
    pub(crate) fn for_course(&self, course_id: CourseId) -> Arc<Mutex<()>> {
        // Guards no data; poison carries no meaning here.
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(registry.entry(course_id).or_default())
    }
}
