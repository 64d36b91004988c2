//! Terminal job outcome.

use std::fmt;

use crate::error::WorkerError;

/// How a job run ended.
///
/// Cancellation is a first-class outcome, not an error: a run that stops
/// because the owner cancelled it exits cleanly, same as success.
#[derive(Debug)]
pub enum JobOutcome {
    /// Artifact produced (or already present) and the record finalized.
    Completed,
    /// Cancellation observed before or during the render.
    Cancelled,
    /// The run failed; the record carries the error message.
    Failed(WorkerError),
}

impl JobOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            JobOutcome::Completed | JobOutcome::Cancelled => 0,
            JobOutcome::Failed(_) => 1,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed => write!(f, "completed"),
            JobOutcome::Cancelled => write!(f, "cancelled"),
            JobOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(JobOutcome::Completed.exit_code(), 0);
        assert_eq!(JobOutcome::Cancelled.exit_code(), 0);
        assert_eq!(
            JobOutcome::Failed(WorkerError::job_failed("x")).exit_code(),
            1
        );
    }
}
