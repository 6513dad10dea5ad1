//! Deterministic task used by unit tests

use super::task::{percent, ProgressiveTask, Step};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts up to `total`, one unit per increment
pub(crate) struct CountingTask {
    pub total: usize,
    pub done: usize,
    pub discarded: bool,
    fail_at: Option<usize>,
    panic_at: Option<usize>,
    ratio_override: Option<u8>,
    alive: Arc<AtomicUsize>,
}

impl CountingTask {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            discarded: false,
            fail_at: None,
            panic_at: None,
            ratio_override: None,
            alive: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn failing_at(mut self, step: usize) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn panicking_at(mut self, step: usize) -> Self {
        self.panic_at = Some(step);
        self
    }

    pub fn with_ratio_override(mut self, ratio: u8) -> Self {
        self.ratio_override = Some(ratio);
        self
    }

    /// Reads 1 while the task is alive and 0 once it has been dropped
    pub fn alive_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.alive)
    }
}

impl Drop for CountingTask {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProgressiveTask for CountingTask {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn step(&mut self) -> Result<Step> {
        if self.done >= self.total {
            return Ok(Step::Done);
        }
        let next = self.done + 1;
        if self.fail_at == Some(next) {
            return Err(Error::InvalidDocument {
                reason: format!("unit {} is malformed", next),
            });
        }
        if self.panic_at == Some(next) {
            panic!("unit {} exploded", next);
        }
        self.done = next;
        if self.done == self.total {
            Ok(Step::Done)
        } else {
            Ok(Step::Pending)
        }
    }

    fn ratio(&self) -> u8 {
        self.ratio_override
            .unwrap_or_else(|| percent(self.done, self.total))
    }

    fn discard(&mut self) {
        self.discarded = true;
    }
}
