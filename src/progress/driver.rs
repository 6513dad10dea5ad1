//! Caller-side loops around `continue_progress`
//!
//! The protocol has no built-in timeout. These helpers implement the usual
//! caller loop: keep continuing until a terminal status, optionally giving up
//! once a deadline passes. The deadline is only checked between calls, so a
//! call already running is never interrupted.

use super::handle::ProgressHandle;
use super::task::{ProgressState, ProgressiveTask};
use std::time::Instant;

/// How a driven task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    Finished,
    Failed,
    /// The deadline passed while the task still had work left.
    /// The handle is untouched and may be resumed or dropped.
    DeadlineExceeded,
}

/// Continue until the task reaches a terminal status
pub fn run_to_completion<T: ProgressiveTask>(handle: &ProgressHandle<T>) -> ProgressState {
    loop {
        let status = handle.continue_progress();
        if status.is_terminal() {
            return status;
        }
    }
}

/// Continue until a terminal status or until `deadline` passes.
///
/// `on_progress` receives the rate of progress after every call.
pub fn drive_until<T, F>(
    handle: &ProgressHandle<T>,
    deadline: Instant,
    mut on_progress: F,
) -> DriveOutcome
where
    T: ProgressiveTask,
    F: FnMut(i32),
{
    loop {
        let (status, ratio) = handle.continue_progress_with_ratio();
        on_progress(ratio);
        match status {
            ProgressState::Finished => return DriveOutcome::Finished,
            ProgressState::Error => return DriveOutcome::Failed,
            ProgressState::ToBeContinued => {
                if Instant::now() >= deadline {
                    tracing::debug!(
                        task = handle.name(),
                        ratio,
                        "deadline exceeded, abandoning drive loop"
                    );
                    return DriveOutcome::DeadlineExceeded;
                }
            }
        }
    }
}
