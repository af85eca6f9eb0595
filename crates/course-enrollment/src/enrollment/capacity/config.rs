use serde::{Deserialize, Serialize};

/// Tunables for the seat policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Permit a student to enroll again in a course they already completed.
    #[serde(default)]
    pub allow_retake: bool,
}
