use serde::{Deserialize, Serialize};

/// Sizing of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepSettings {
    /// Number of concurrent workers
    pub workers: usize,
    /// Batches that may queue up before `receive` blocks the upstream
    pub work_ahead: usize,
    /// Whether batches leave the step in ticket order
    pub ordered: bool,
}

impl Default for StepSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            work_ahead: 16,
            ordered: true,
        }
    }
}

impl StepSettings {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_work_ahead(mut self, work_ahead: usize) -> Self {
        self.work_ahead = work_ahead;
        self
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }
}
