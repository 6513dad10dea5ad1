//! Progressive operation protocol
//!
//! A long-running operation is a [`ProgressiveTask`] advanced in bounded
//! increments through a [`ProgressHandle`]. Each `continue_progress` call runs
//! increments until the task finishes, fails, or the caller's
//! [`PauseController`] asks it to suspend.

mod driver;
mod handle;
mod pause;
mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{drive_until, run_to_completion, DriveOutcome};
pub use handle::ProgressHandle;
pub use pause::{
    pause_fn, NeverPause, PauseController, PauseEvery, PauseFlag, PauseFn, SharedPause, TimeSlice,
};
pub use task::{ProgressState, ProgressiveTask, Step, TaskState};

pub(crate) use task::percent;
