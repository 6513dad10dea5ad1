//! Library context and the `start_*` factories

use crate::document::Document;
use crate::error::Result;
use crate::ops::{
    IndexTask, ReflowOptions, ReflowTask, RenderLimits, RenderOptions, RenderTask, SharedIndex,
};
use crate::progress::{ProgressHandle, SharedPause};
use std::sync::Arc;

/// Increment sizes and resource limits for progressive operations
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Page objects painted per render increment (default: 16)
    pub render_objects_per_step: usize,
    /// Pages reflowed per increment (default: 1)
    pub reflow_pages_per_step: usize,
    /// Pages indexed per increment (default: 1)
    pub index_pages_per_step: usize,
    /// Cap on increments per `continue_progress` call (default: none)
    pub max_steps_per_call: Option<u32>,
    /// Maximum render scale factor (default: 10.0)
    pub max_render_scale: f32,
    /// Maximum bitmap pixel area (default: 100_000_000)
    pub max_render_pixels: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            render_objects_per_step: 16,
            reflow_pages_per_step: 1,
            index_pages_per_step: 1,
            max_steps_per_call: None,
            max_render_scale: 10.0,
            max_render_pixels: 100_000_000,
        }
    }
}

/// Entry point for progressive operations.
///
/// Construct once and pass by reference to whatever starts operations. Each
/// `start_*` call validates its inputs and performs setup synchronously, then
/// returns a handle primed for `continue_progress`.
#[derive(Debug)]
pub struct Library {
    config: LibraryConfig,
}

impl Library {
    pub fn new(config: LibraryConfig) -> Self {
        tracing::info!(?config, "progressive library initialized");
        Self { config }
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    fn handle<T: crate::progress::ProgressiveTask>(
        &self,
        task: T,
        pause: Option<SharedPause>,
    ) -> ProgressHandle<T> {
        ProgressHandle::start(task, pause).with_step_limit(self.config.max_steps_per_call)
    }

    /// Start rendering a page (1-based) into an RGBA bitmap
    pub fn start_render(
        &self,
        document: Arc<Document>,
        page: u32,
        options: &RenderOptions,
        pause: Option<SharedPause>,
    ) -> Result<ProgressHandle<RenderTask>> {
        let limits = RenderLimits {
            objects_per_step: self.config.render_objects_per_step,
            max_scale: self.config.max_render_scale,
            max_pixels: self.config.max_render_pixels,
        };
        let task = RenderTask::new(document, page, options, limits)?;
        Ok(self.handle(task, pause))
    }

    /// Start reflowing the selected pages, or the whole document for `None`
    pub fn start_reflow(
        &self,
        document: Arc<Document>,
        pages: Option<&[u32]>,
        options: ReflowOptions,
        pause: Option<SharedPause>,
    ) -> Result<ProgressHandle<ReflowTask>> {
        let task = ReflowTask::new(document, pages, options, self.config.reflow_pages_per_step)?;
        Ok(self.handle(task, pause))
    }

    /// Start indexing a document into `index` under `name`.
    ///
    /// The index only sees the document once the task finishes.
    pub fn start_index(
        &self,
        index: &SharedIndex,
        document: Arc<Document>,
        name: &str,
        pause: Option<SharedPause>,
    ) -> Result<ProgressHandle<IndexTask>> {
        let task = IndexTask::new(
            Arc::clone(index),
            document,
            name,
            self.config.index_pages_per_step,
        )?;
        Ok(self.handle(task, pause))
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new(LibraryConfig::default())
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        tracing::debug!("progressive library released");
    }
}
