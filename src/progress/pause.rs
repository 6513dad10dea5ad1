//! Pause controllers consulted between work increments

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-supplied capability deciding whether a running task should suspend.
///
/// It is consulted, not commanded: a task only asks between increments, so
/// one large atomic increment delays the pause until it completes.
pub trait PauseController: Send + Sync {
    fn needs_to_pause(&self) -> bool;
}

/// Pause controller shared between the caller and every handle view of a task
pub type SharedPause = Arc<dyn PauseController>;

/// Never pauses; equivalent to supplying no controller
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPause;

impl PauseController for NeverPause {
    fn needs_to_pause(&self) -> bool {
        false
    }
}

/// Pauses on every `interval`-th check
#[derive(Debug)]
pub struct PauseEvery {
    interval: u32,
    checks: AtomicU32,
}

impl PauseEvery {
    /// An interval of 0 is treated as 1 (pause on every check)
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            checks: AtomicU32::new(0),
        }
    }

    /// Number of times the controller has been consulted
    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::Relaxed)
    }
}

impl PauseController for PauseEvery {
    fn needs_to_pause(&self) -> bool {
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        n % self.interval == 0
    }
}

/// Pauses while an external request flag is raised
#[derive(Debug, Default)]
pub struct PauseFlag {
    requested: AtomicBool,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.requested.store(false, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl PauseController for PauseFlag {
    fn needs_to_pause(&self) -> bool {
        self.is_requested()
    }
}

/// Pauses once a time budget has elapsed since the slice was last armed.
///
/// An unarmed slice never pauses. Re-arm before each `continue_progress` call.
#[derive(Debug)]
pub struct TimeSlice {
    budget: Duration,
    deadline: Mutex<Option<Instant>>,
}

impl TimeSlice {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            deadline: Mutex::new(None),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Start a new slice using the default budget
    pub fn arm(&self) {
        self.arm_for(self.budget);
    }

    /// Start a new slice with an explicit budget. A budget too large to
    /// represent leaves the slice unarmed.
    pub fn arm_for(&self, budget: Duration) {
        *self.deadline.lock() = Instant::now().checked_add(budget);
    }

    pub fn disarm(&self) {
        *self.deadline.lock() = None;
    }
}

impl PauseController for TimeSlice {
    fn needs_to_pause(&self) -> bool {
        self.deadline
            .lock()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Adapts a closure into a pause controller
pub struct PauseFn<F>(pub F);

impl<F> PauseController for PauseFn<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn needs_to_pause(&self) -> bool {
        (self.0)()
    }
}

/// Wrap a closure as a shared pause controller
pub fn pause_fn<F>(f: F) -> SharedPause
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    Arc::new(PauseFn(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_pause() {
        let pause = NeverPause;
        for _ in 0..100 {
            assert!(!pause.needs_to_pause());
        }
    }

    #[test]
    fn test_pause_every() {
        let pause = PauseEvery::new(3);
        let seen: Vec<bool> = (0..7).map(|_| pause.needs_to_pause()).collect();
        assert_eq!(seen, vec![false, false, true, false, false, true, false]);
        assert_eq!(pause.checks(), 7);
    }

    #[test]
    fn test_pause_every_zero_interval() {
        let pause = PauseEvery::new(0);
        assert!(pause.needs_to_pause());
        assert!(pause.needs_to_pause());
    }

    #[test]
    fn test_pause_flag() {
        let flag = PauseFlag::new();
        assert!(!flag.needs_to_pause());
        flag.request();
        assert!(flag.needs_to_pause());
        flag.clear();
        assert!(!flag.needs_to_pause());
    }

    #[test]
    fn test_time_slice() {
        let slice = TimeSlice::new(Duration::from_secs(3600));
        assert!(!slice.needs_to_pause(), "unarmed slice never pauses");

        slice.arm();
        assert!(!slice.needs_to_pause());

        slice.arm_for(Duration::ZERO);
        assert!(slice.needs_to_pause());

        slice.arm_for(Duration::MAX);
        assert!(!slice.needs_to_pause());
        slice.arm_for(Duration::ZERO);
        assert!(slice.needs_to_pause());

        slice.disarm();
        assert!(!slice.needs_to_pause());
    }

    #[test]
    fn test_pause_fn() {
        let flag = Arc::new(AtomicBool::new(false));
        let observed = flag.clone();
        let pause = pause_fn(move || observed.load(Ordering::SeqCst));
        assert!(!pause.needs_to_pause());
        flag.store(true, Ordering::SeqCst);
        assert!(pause.needs_to_pause());
    }
}
