//! Resumable task abstraction

use crate::error::Result;
use serde::Serialize;

/// Outcome of a single work increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More increments are needed
    Pending,
    /// The operation is complete
    Done,
}

/// Lifecycle of a progressive task
///
/// `NotStarted` only exists while a factory is priming the task; callers
/// observe `InProgress`, `Finished` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    InProgress,
    Finished,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }
}

/// Status returned from `ProgressHandle::continue_progress`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    /// Operation completed, rate of progress is 100
    Finished,
    /// Operation is incomplete, call `continue_progress` again
    ToBeContinued,
    /// Operation failed, rate of progress is -1
    Error,
}

impl ProgressState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProgressState::ToBeContinued)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressState::Finished => "finished",
            ProgressState::ToBeContinued => "to_be_continued",
            ProgressState::Error => "error",
        }
    }
}

/// A long-running operation split into bounded increments.
///
/// Implementors own their work context exclusively. `step` performs one
/// increment and must leave the task in a state from which the next call
/// resumes exactly where this one stopped. Returning `Err` (or panicking)
/// moves the owning handle into its terminal error state.
pub trait ProgressiveTask: Send {
    /// Short operation name used in logs
    fn name(&self) -> &'static str;

    /// Perform one bounded increment of work
    fn step(&mut self) -> Result<Step>;

    /// Approximate completion in percent (0..=100)
    fn ratio(&self) -> u8;

    /// Drop partially built output after the task failed
    fn discard(&mut self) {}
}

/// Integer percentage of `done` out of `total`, where an empty workload counts as complete
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total);
    ((done * 100) / total) as u8
}
