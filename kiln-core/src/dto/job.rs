//! Job DTOs

use serde::{Deserialize, Serialize};

/// Acknowledgement for a job submitted with a callback URL
///
/// The result is delivered to the callback once the job finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: i64,
    pub status: String,
}

impl JobAccepted {
    pub fn new(job_id: i64) -> Self {
        Self {
            job_id,
            status: "accepted".to_string(),
        }
    }
}
