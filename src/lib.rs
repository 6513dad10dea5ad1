//! Progressive document operations
//!
//! Long-running operations run as resumable tasks advanced in bounded
//! increments:
//! - `start_render`: paint a page into an RGBA bitmap
//! - `start_reflow`: reading-order text wrapped to a fixed width
//! - `start_index`: add a document to a phrase search index
//!
//! Each returns a [`ProgressHandle`]; callers drive it with
//! `continue_progress` and decide when to yield through a [`PauseController`].
//! The `server` module exposes the same operations as MCP tools.

pub mod document;
pub mod error;
pub mod library;
pub mod ops;
pub mod progress;
pub mod registry;
pub mod server;

pub use error::{Error, Result};
pub use library::{Library, LibraryConfig};
pub use progress::{
    PauseController, ProgressHandle, ProgressState, ProgressiveTask, SharedPause, TaskState,
};
pub use server::{
    run_server, run_server_with_config, run_server_with_dirs, DocumentSource, ProgressServer,
    ServerConfig,
};
