//! Caller-facing handle driving a progressive task

use super::pause::SharedPause;
use super::task::{ProgressState, ProgressiveTask, Step, TaskState};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const RATIO_FAILED: i32 = -1;
const RATIO_FINISHED: i32 = 100;
// Highest ratio reported while work remains
const RATIO_MAX_PENDING: u8 = 99;

struct TaskCore<T: ProgressiveTask> {
    task: T,
    state: TaskState,
    ratio: i32,
    steps: u64,
}

impl<T: ProgressiveTask> TaskCore<T> {
    fn pending_ratio(&self) -> i32 {
        i32::from(self.task.ratio().min(RATIO_MAX_PENDING))
    }

    fn advance_ratio(&mut self) {
        let ratio = self.pending_ratio();
        if ratio > self.ratio {
            self.ratio = ratio;
        }
    }

    fn finish(&mut self) {
        self.state = TaskState::Finished;
        self.ratio = RATIO_FINISHED;
    }

    fn fail(&mut self) {
        self.state = TaskState::Failed;
        self.ratio = RATIO_FAILED;
        self.task.discard();
    }
}

impl<T: ProgressiveTask> Drop for TaskCore<T> {
    fn drop(&mut self) {
        if self.state == TaskState::InProgress {
            tracing::debug!(
                task = self.task.name(),
                ratio = self.ratio,
                "releasing unfinished progressive task"
            );
        }
    }
}

/// State and ratio packed into one word so readers never see a torn pair
fn pack(state: TaskState, ratio: i32) -> u64 {
    let state = match state {
        TaskState::NotStarted => 0u64,
        TaskState::InProgress => 1,
        TaskState::Finished => 2,
        TaskState::Failed => 3,
    };
    (state << 32) | u64::from(ratio as u32)
}

fn unpack(word: u64) -> (TaskState, i32) {
    let state = match word >> 32 {
        0 => TaskState::NotStarted,
        1 => TaskState::InProgress,
        2 => TaskState::Finished,
        _ => TaskState::Failed,
    };
    (state, word as u32 as i32)
}

/// Task plus a lock-free copy of its progress.
///
/// The snapshot is written while the core lock is held and read without it,
/// so progress queries never wait for a running `continue_progress`.
struct Shared<T: ProgressiveTask> {
    core: Mutex<TaskCore<T>>,
    name: &'static str,
    status: AtomicU64,
    steps: AtomicU64,
}

impl<T: ProgressiveTask> Shared<T> {
    fn publish(&self, core: &TaskCore<T>) {
        self.status
            .store(pack(core.state, core.ratio), Ordering::Release);
        self.steps.store(core.steps, Ordering::Release);
    }

    fn snapshot(&self) -> (TaskState, i32) {
        unpack(self.status.load(Ordering::Acquire))
    }
}

/// Handle to a running progressive task.
///
/// Cloning produces another view of the same task; work is never duplicated.
/// The task and everything it accumulated are released when the last view
/// is dropped, whatever state it is in.
pub struct ProgressHandle<T: ProgressiveTask> {
    shared: Arc<Shared<T>>,
    pause: Option<SharedPause>,
    max_steps_per_call: Option<u32>,
}

impl<T: ProgressiveTask> Clone for ProgressHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            pause: self.pause.clone(),
            max_steps_per_call: self.max_steps_per_call,
        }
    }
}

impl<T: ProgressiveTask> std::fmt::Debug for ProgressHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (state, ratio) = self.shared.snapshot();
        f.debug_struct("ProgressHandle")
            .field("task", &self.shared.name)
            .field("state", &state)
            .field("ratio", &ratio)
            .field("steps", &self.steps_executed())
            .finish()
    }
}

impl<T: ProgressiveTask> ProgressHandle<T> {
    /// Wrap an already set-up task. `pause` is consulted between increments;
    /// `None` means the task never pauses.
    ///
    /// The ratio is 0 until the first increment has run, even for a task
    /// with nothing to do.
    pub fn start(task: T, pause: Option<SharedPause>) -> Self {
        let name = task.name();
        let core = TaskCore {
            task,
            state: TaskState::InProgress,
            ratio: 0,
            steps: 0,
        };

        tracing::debug!(
            task = name,
            pausable = pause.is_some(),
            "progressive task started"
        );

        let shared = Shared {
            status: AtomicU64::new(pack(core.state, core.ratio)),
            steps: AtomicU64::new(0),
            core: Mutex::new(core),
            name,
        };
        Self {
            shared: Arc::new(shared),
            pause,
            max_steps_per_call: None,
        }
    }

    /// Cap the number of increments a single `continue_progress` call performs
    pub fn with_step_limit(mut self, max_steps_per_call: Option<u32>) -> Self {
        self.max_steps_per_call = max_steps_per_call.map(|max| max.max(1));
        self
    }

    /// Advance the task until it completes, fails, or is asked to pause.
    ///
    /// Terminal tasks return their terminal status without doing any work.
    /// Failures and panics inside an increment are logged and turned into
    /// `ProgressState::Error`.
    pub fn continue_progress(&self) -> ProgressState {
        self.continue_progress_with_ratio().0
    }

    /// Like `continue_progress`, also returning the ratio this call ended on.
    ///
    /// Another view may advance the task as soon as this call returns, so
    /// reading `rate_of_progress` afterwards can disagree with the status.
    pub fn continue_progress_with_ratio(&self) -> (ProgressState, i32) {
        let mut core = self.shared.core.lock();
        let status = self.advance(&mut core);
        self.shared.publish(&core);
        (status, core.ratio)
    }

    fn advance(&self, core: &mut TaskCore<T>) -> ProgressState {
        match core.state {
            TaskState::Finished => return ProgressState::Finished,
            TaskState::Failed => return ProgressState::Error,
            TaskState::NotStarted | TaskState::InProgress => {}
        }

        let mut steps_this_call: u32 = 0;
        loop {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| core.task.step()));
            core.steps += 1;
            steps_this_call = steps_this_call.saturating_add(1);

            match outcome {
                Ok(Ok(Step::Done)) => {
                    core.finish();
                    tracing::debug!(
                        task = self.shared.name,
                        steps = core.steps,
                        "progressive task finished"
                    );
                    return ProgressState::Finished;
                }
                Ok(Ok(Step::Pending)) => core.advance_ratio(),
                Ok(Err(e)) => {
                    tracing::warn!(
                        task = self.shared.name,
                        step = core.steps,
                        error = %e,
                        "progressive task failed"
                    );
                    core.fail();
                    return ProgressState::Error;
                }
                Err(payload) => {
                    tracing::warn!(
                        task = self.shared.name,
                        step = core.steps,
                        panic = panic_message(payload.as_ref()),
                        "progressive task panicked"
                    );
                    core.fail();
                    return ProgressState::Error;
                }
            }
            self.shared.publish(core);

            if self
                .max_steps_per_call
                .is_some_and(|max| steps_this_call >= max)
            {
                return ProgressState::ToBeContinued;
            }
            if self
                .pause
                .as_ref()
                .is_some_and(|pause| pause.needs_to_pause())
            {
                tracing::debug!(
                    task = self.shared.name,
                    ratio = core.ratio,
                    "progressive task paused"
                );
                return ProgressState::ToBeContinued;
            }
        }
    }

    /// Current completion ratio: 0..=99 while running, 100 when finished, -1 on failure.
    ///
    /// Never waits for a running `continue_progress`.
    pub fn rate_of_progress(&self) -> i32 {
        self.shared.snapshot().1
    }

    pub fn state(&self) -> TaskState {
        self.shared.snapshot().0
    }

    /// Total increments executed over the task's lifetime
    pub fn steps_executed(&self) -> u64 {
        self.shared.steps.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Number of live views of this task
    pub fn view_count(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Read the task's work context, e.g. to collect output after `Finished`
    pub fn with_task<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.shared.core.lock().task)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
