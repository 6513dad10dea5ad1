//! Registry of running tasks addressed by id

use crate::ops::{IndexTask, ReflowTask, RenderTask};
use crate::progress::{ProgressHandle, ProgressState, TaskState, TimeSlice};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// A handle to any of the operations the server can start
#[derive(Debug, Clone)]
pub enum TaskHandle {
    Render(ProgressHandle<RenderTask>),
    Reflow(ProgressHandle<ReflowTask>),
    Index(ProgressHandle<IndexTask>),
}

impl TaskHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Render(h) => h.name(),
            Self::Reflow(h) => h.name(),
            Self::Index(h) => h.name(),
        }
    }

    pub fn continue_progress(&self) -> ProgressState {
        match self {
            Self::Render(h) => h.continue_progress(),
            Self::Reflow(h) => h.continue_progress(),
            Self::Index(h) => h.continue_progress(),
        }
    }

    /// Status and the ratio it was reached at, read under one lock
    pub fn continue_progress_with_ratio(&self) -> (ProgressState, i32) {
        match self {
            Self::Render(h) => h.continue_progress_with_ratio(),
            Self::Reflow(h) => h.continue_progress_with_ratio(),
            Self::Index(h) => h.continue_progress_with_ratio(),
        }
    }

    pub fn rate_of_progress(&self) -> i32 {
        match self {
            Self::Render(h) => h.rate_of_progress(),
            Self::Reflow(h) => h.rate_of_progress(),
            Self::Index(h) => h.rate_of_progress(),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Self::Render(h) => h.state(),
            Self::Reflow(h) => h.state(),
            Self::Index(h) => h.state(),
        }
    }

    pub fn steps_executed(&self) -> u64 {
        match self {
            Self::Render(h) => h.steps_executed(),
            Self::Reflow(h) => h.steps_executed(),
            Self::Index(h) => h.steps_executed(),
        }
    }
}

/// A task plus the bookkeeping the server keeps for it
#[derive(Debug, Clone)]
pub struct RegisteredTask {
    pub handle: TaskHandle,
    /// Where the document came from
    pub source: String,
    pub started_at: DateTime<Utc>,
    /// Pause controller the handle was started with; armed per call
    pub slice: Arc<TimeSlice>,
    /// Held for a whole arm/continue/disarm cycle so calls on one task take turns
    pub turn: Arc<tokio::sync::Mutex<()>>,
}

impl RegisteredTask {
    pub fn new(handle: TaskHandle, source: String, slice: Arc<TimeSlice>) -> Self {
        Self {
            handle,
            source,
            started_at: Utc::now(),
            slice,
            turn: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

/// Summary row for task listings
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub kind: String,
    pub source: String,
    pub state: TaskState,
    pub ratio: i32,
    pub started_at: String,
}

/// Bounded registry of tasks. When full, the least recently used task is
/// evicted and its work released.
pub struct TaskRegistry {
    inner: Mutex<LruCache<String, RegisteredTask>>,
}

impl TaskRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Register a task under a fresh id
    pub fn insert(&self, task: RegisteredTask) -> String {
        let mut inner = self.inner.lock();
        let id = loop {
            let id = uuid::Uuid::new_v4().to_string();
            if !inner.contains(&id) {
                break id;
            }
        };
        if let Some((evicted, old)) = inner.push(id.clone(), task) {
            tracing::warn!(
                task_id = %evicted,
                kind = old.handle.kind(),
                state = ?old.handle.state(),
                "task registry full, evicted least recently used task"
            );
        }
        id
    }

    /// Another view of a registered task, marking it recently used
    pub fn get(&self, id: &str) -> Option<RegisteredTask> {
        self.inner.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains(id)
    }

    pub fn remove(&self, id: &str) -> Option<RegisteredTask> {
        self.inner.lock().pop(id)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Summaries of all tasks, most recently used first.
    ///
    /// Views are cloned out first so the registry is not locked while tasks
    /// are queried.
    pub fn list(&self) -> Vec<TaskSummary> {
        let tasks: Vec<(String, RegisteredTask)> = self
            .inner
            .lock()
            .iter()
            .map(|(id, task)| (id.clone(), task.clone()))
            .collect();
        tasks
            .into_iter()
            .map(|(id, task)| TaskSummary {
                task_id: id,
                kind: task.handle.kind().to_string(),
                source: task.source,
                state: task.handle.state(),
                ratio: task.handle.rate_of_progress(),
                started_at: task.started_at.to_rfc3339(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Page};
    use crate::library::Library;
    use crate::ops::ReflowOptions;
    use std::time::Duration;

    fn reflow_task(library: &Library, pages: usize) -> RegisteredTask {
        let doc = Arc::new(Document::new(vec![Page::new(10.0, 10.0); pages]));
        let slice = Arc::new(TimeSlice::new(Duration::from_millis(50)));
        let handle = library
            .start_reflow(doc, None, ReflowOptions::default(), Some(slice.clone()))
            .unwrap();
        RegisteredTask::new(TaskHandle::Reflow(handle), "memory".to_string(), slice)
    }

    #[test]
    fn test_registry_basic_operations() {
        let library = Library::default();
        let registry = TaskRegistry::new(10);
        assert!(registry.is_empty());

        let id = registry.insert(reflow_task(&library, 2));
        assert_eq!(id.len(), 36); // UUID format
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));
        assert!(!registry.contains("missing"));

        let task = registry.get(&id).unwrap();
        assert_eq!(task.handle.kind(), "reflow");
        assert_eq!(task.handle.continue_progress(), ProgressState::Finished);

        // The registry holds a view of the same task
        let again = registry.get(&id).unwrap();
        assert_eq!(again.handle.rate_of_progress(), 100);
    }

    #[test]
    fn test_registry_eviction() {
        let library = Library::default();
        let registry = TaskRegistry::new(2);

        let id1 = registry.insert(reflow_task(&library, 1));
        let id2 = registry.insert(reflow_task(&library, 1));
        let id3 = registry.insert(reflow_task(&library, 1));

        // id1 should be evicted (LRU)
        assert!(!registry.contains(&id1));
        assert!(registry.contains(&id2));
        assert!(registry.contains(&id3));
    }

    #[test]
    fn test_registry_get_refreshes_recency() {
        let library = Library::default();
        let registry = TaskRegistry::new(2);

        let id1 = registry.insert(reflow_task(&library, 1));
        let id2 = registry.insert(reflow_task(&library, 1));
        registry.get(&id1);
        let id3 = registry.insert(reflow_task(&library, 1));

        assert!(registry.contains(&id1));
        assert!(!registry.contains(&id2));
        assert!(registry.contains(&id3));
    }

    #[test]
    fn test_registry_remove_and_clear() {
        let library = Library::default();
        let registry = TaskRegistry::new(10);

        let id = registry.insert(reflow_task(&library, 1));
        registry.insert(reflow_task(&library, 1));

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_list() {
        let library = Library::default();
        let registry = TaskRegistry::new(10);
        let id = registry.insert(reflow_task(&library, 3));

        let listing = registry.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].task_id, id);
        assert_eq!(listing[0].kind, "reflow");
        assert_eq!(listing[0].state, TaskState::InProgress);
        assert_eq!(listing[0].ratio, 0);
    }

    #[test]
    fn test_zero_capacity_holds_one_task() {
        let library = Library::default();
        let registry = TaskRegistry::new(0);
        registry.insert(reflow_task(&library, 1));
        registry.insert(reflow_task(&library, 1));
        assert_eq!(registry.len(), 1);
    }
}
