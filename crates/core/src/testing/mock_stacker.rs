use std::sync::Mutex;

use async_trait::async_trait;

use crate::primitives::{StackError, StackJob, StackOutcome, Stacker};

/// Mock stacker that records every job it receives.
pub struct MockStacker {
    jobs: Mutex<Vec<StackJob>>,
    should_fail: bool,
}

impl MockStacker {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            should_fail: false,
        }
    }

    /// A stacker whose every build fails.
    pub fn failing() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            should_fail: true,
        }
    }

    /// All jobs received so far.
    pub fn jobs(&self) -> Vec<StackJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Default for MockStacker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stacker for MockStacker {
    async fn stack(&self, job: &StackJob) -> Result<StackOutcome, StackError> {
        if self.should_fail {
            return Err(StackError::Failed("mock failure".to_string()));
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(StackOutcome {
            checksum: format!("mock-{}", job.id),
        })
    }
}
