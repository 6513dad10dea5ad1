//! MCP Server exposing progressive operations as resumable tasks

use crate::document::{parse_page_range, resolve_base64, resolve_path, ResolvedDocument};
use crate::error::Error;
use crate::library::{Library, LibraryConfig};
use crate::ops::{
    ReflowOptions, ReflowPage, RenderOptions, SearchHit, SearchIndex, SearchOptions, SharedIndex,
};
use crate::progress::{ProgressState, TaskState, TimeSlice};
use crate::registry::{RegisteredTask, TaskHandle, TaskRegistry, TaskSummary};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*, tool,
    tool_handler, tool_router, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Where a document is loaded from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum DocumentSource {
    /// File path (absolute or relative)
    Path {
        /// Path to a PDF or document JSON file
        path: String,
    },
    /// Base64 encoded PDF or document JSON
    Base64 {
        /// Base64 encoded content
        base64: String,
    },
}

impl<'de> serde::Deserialize<'de> for DocumentSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with \"path\" or \"base64\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )));
        };

        for key in ["path", "base64"] {
            if let Some(v) = obj.get(key) {
                let Some(s) = v.as_str() else {
                    return Err(serde::de::Error::custom(format!(
                        "\"{}\" must be a string",
                        key
                    )));
                };
                let s = s.to_string();
                return Ok(if key == "path" {
                    DocumentSource::Path { path: s }
                } else {
                    DocumentSource::Base64 { base64: s }
                });
            }
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with \"path\" or \"base64\", but got keys: {:?}",
            keys
        )))
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories documents may be read from (empty allows any path)
    pub resource_dirs: Vec<String>,
    /// Maximum number of tasks kept before the least recently used is evicted (default: 64)
    pub max_tasks: usize,
    /// Default time slice per `continue_task` call in milliseconds (default: 200)
    pub slice_ms: u64,
    /// Upper bound on a client-requested time slice in milliseconds (default: 10_000)
    pub max_slice_ms: u64,
    pub library: LibraryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            max_tasks: 64,
            slice_ms: 200,
            max_slice_ms: 10_000,
            library: LibraryConfig::default(),
        }
    }
}

/// Progressive operations MCP Server
#[derive(Clone)]
pub struct ProgressServer {
    library: Arc<Library>,
    registry: Arc<TaskRegistry>,
    index: SharedIndex,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for starting tasks
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartRenderParams {
    /// Document to render
    pub source: DocumentSource,
    /// Page number (1-indexed, default: 1)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Pixels per point (default: 1.0)
    #[serde(default)]
    pub scale: Option<f32>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartReflowParams {
    /// Document to reflow
    pub source: DocumentSource,
    /// Page range (e.g., "1-5,10"). Defaults to all pages.
    #[serde(default)]
    pub pages: Option<String>,
    /// Maximum characters per output line (default: 60)
    #[serde(default)]
    pub line_width: Option<usize>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartIndexParams {
    /// Document to index
    pub source: DocumentSource,
    /// Name the document is indexed under (default: the source name)
    #[serde(default)]
    pub name: Option<String>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartTaskResult {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for driving tasks
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContinueTaskParams {
    /// Task id returned by a start_* tool
    pub task_id: String,
    /// Time budget for this call in milliseconds (default: server setting, capped by the server)
    #[serde(default)]
    pub slice_ms: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskIdParams {
    /// Task id returned by a start_* tool
    pub task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTasksParams {}

/// Result of a finished task
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    Render {
        page: u32,
        width: u32,
        height: u32,
        mime_type: String,
        data_base64: String,
    },
    Reflow {
        pages: Vec<ReflowPage>,
    },
    Index {
        document: String,
        pages_indexed: usize,
        term_count: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct ContinueTaskResult {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgressState>,
    pub ratio: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResult {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    pub ratio: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for search
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Phrase to search for
    pub query: String,
    /// Case-sensitive search
    #[serde(default)]
    pub case_sensitive: bool,
    /// Maximum number of results
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Characters of context around each match
    #[serde(default = "default_context_chars")]
    pub context_chars: u32,
}

fn default_max_results() -> u32 {
    100
}

fn default_context_chars() -> u32 {
    50
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub documents: Vec<String>,
    pub matches: Vec<SearchHit>,
    pub total_matches: u32,
}

#[tool_router]
impl ProgressServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new ProgressServer with specified resource directories
    pub fn with_resource_dirs(dirs: Vec<String>) -> Self {
        Self::with_config(ServerConfig {
            resource_dirs: dirs,
            ..ServerConfig::default()
        })
    }

    /// Create a new ProgressServer with full configuration
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            library: Arc::new(Library::new(config.library.clone())),
            registry: Arc::new(TaskRegistry::new(config.max_tasks)),
            index: SearchIndex::shared(),
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    #[tool(
        description = "Start rendering one page of a document to a PNG image. Returns a task_id; drive it with continue_task until status is \"finished\".

Source format: {\"path\": \"/absolute/path.pdf\"} or {\"base64\": \"...\"}"
    )]
    async fn start_render(&self, Parameters(params): Parameters<StartRenderParams>) -> String {
        let result = self.process_start_render(&params).await;
        Self::start_response(&params.source, result, "start_render")
    }

    #[tool(
        description = "Start reflowing document text into fixed-width lines in reading order (columns, paragraphs and watermarks handled). Returns a task_id; drive it with continue_task.

Source format: {\"path\": \"/absolute/path.pdf\"} or {\"base64\": \"...\"}"
    )]
    async fn start_reflow(&self, Parameters(params): Parameters<StartReflowParams>) -> String {
        let result = self.process_start_reflow(&params).await;
        Self::start_response(&params.source, result, "start_reflow")
    }

    #[tool(
        description = "Start adding a document to the server's search index. The document becomes searchable once the task finishes. Returns a task_id; drive it with continue_task.

Source format: {\"path\": \"/absolute/path.pdf\"} or {\"base64\": \"...\"}"
    )]
    async fn start_index(&self, Parameters(params): Parameters<StartIndexParams>) -> String {
        let result = self.process_start_index(&params).await;
        Self::start_response(&params.source, result, "start_index")
    }

    #[tool(
        description = "Run a task for up to slice_ms milliseconds. Returns status (\"to_be_continued\", \"finished\" or \"error\"), ratio (0-100, -1 on error) and the output once finished."
    )]
    async fn continue_task(&self, Parameters(params): Parameters<ContinueTaskParams>) -> String {
        let result = self
            .process_continue_task(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, task_id = %params.task_id, "continue_task failed");
                ContinueTaskResult {
                    task_id: params.task_id.clone(),
                    status: None,
                    ratio: -1,
                    output: None,
                    error: Some(e.client_message()),
                }
            });
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    #[tool(description = "Get the state and completion ratio of a task without advancing it.")]
    async fn get_progress(&self, Parameters(params): Parameters<TaskIdParams>) -> String {
        let result = match self.registry.get(&params.task_id) {
            Some(task) => ProgressResult {
                task_id: params.task_id,
                kind: Some(task.handle.kind().to_string()),
                state: Some(task.handle.state()),
                ratio: task.handle.rate_of_progress(),
                steps: Some(task.handle.steps_executed()),
                error: None,
            },
            None => ProgressResult {
                error: Some(
                    Error::TaskNotFound {
                        id: params.task_id.clone(),
                    }
                    .client_message(),
                ),
                task_id: params.task_id,
                kind: None,
                state: None,
                ratio: -1,
                steps: None,
            },
        };
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }

    #[tool(
        description = "Release a task and everything it has accumulated. Unfinished index tasks leave the search index unchanged."
    )]
    async fn release_task(&self, Parameters(params): Parameters<TaskIdParams>) -> String {
        let released = self.registry.remove(&params.task_id).is_some();
        if released {
            tracing::debug!(task_id = %params.task_id, "task released");
        }
        let response = serde_json::json!({
            "task_id": params.task_id,
            "released": released,
        });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    #[tool(description = "List registered tasks with their state and completion ratio.")]
    async fn list_tasks(&self, Parameters(_params): Parameters<ListTasksParams>) -> String {
        let tasks: Vec<TaskSummary> = self.registry.list();
        let response = serde_json::json!({
            "total_count": tasks.len(),
            "tasks": tasks,
        });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    #[tool(
        description = "Search for a phrase in all documents indexed by finished start_index tasks. Returns matching text with context and page locations."
    )]
    async fn search(&self, Parameters(params): Parameters<SearchParams>) -> String {
        let result = self.process_search(&params);
        serde_json::to_string_pretty(&result).unwrap_or_default()
    }
}

impl ProgressServer {
    fn source_name(source: &DocumentSource) -> String {
        match source {
            DocumentSource::Path { path } => path.clone(),
            DocumentSource::Base64 { .. } => "<base64>".to_string(),
        }
    }

    fn start_response(
        source: &DocumentSource,
        result: crate::error::Result<(String, &'static str)>,
        tool: &str,
    ) -> String {
        let response = match result {
            Ok((task_id, kind)) => StartTaskResult {
                source: Self::source_name(source),
                task_id: Some(task_id),
                kind: Some(kind.to_string()),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, tool, "task setup failed");
                StartTaskResult {
                    source: Self::source_name(source),
                    task_id: None,
                    kind: None,
                    error: Some(e.client_message()),
                }
            }
        };
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    async fn resolve_source(
        &self,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> crate::error::Result<ResolvedDocument> {
        let source = source.clone();
        let password = password.map(str::to_string);
        let path = match &source {
            DocumentSource::Path { path } => Some(self.validate_path_access(path)?),
            DocumentSource::Base64 { .. } => None,
        };

        tokio::task::spawn_blocking(move || match (path, &source) {
            (Some(path), _) => resolve_path(path, password.as_deref()).map(|mut resolved| {
                resolved.source_name = Self::source_name(&source);
                resolved
            }),
            (None, DocumentSource::Base64 { base64 }) => {
                resolve_base64(base64, password.as_deref())
            }
            (None, DocumentSource::Path { path }) => Err(Error::DocumentNotFound {
                path: path.clone(),
            }),
        })
        .await
        .map_err(|e| Error::Pdfium {
            reason: format!("Task join error: {}", e),
        })?
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| Error::PathAccessDenied {
            path: path.to_string(),
        })?;

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    fn register(&self, handle: TaskHandle, source: String, slice: Arc<TimeSlice>) -> String {
        let kind = handle.kind();
        let task_id = self
            .registry
            .insert(RegisteredTask::new(handle, source, slice));
        tracing::info!(task_id = %task_id, kind, "task started");
        task_id
    }

    /// Requested slice length, clamped to the server maximum
    fn slice_budget_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.config.slice_ms)
            .min(self.config.max_slice_ms)
    }

    fn new_slice(&self) -> Arc<TimeSlice> {
        Arc::new(TimeSlice::new(Duration::from_millis(self.config.slice_ms)))
    }

    async fn process_start_render(
        &self,
        params: &StartRenderParams,
    ) -> crate::error::Result<(String, &'static str)> {
        let resolved = self
            .resolve_source(&params.source, params.password.as_deref())
            .await?;
        let options = RenderOptions {
            scale: params.scale.unwrap_or(1.0),
            ..RenderOptions::default()
        };
        let slice = self.new_slice();
        let handle = self.library.start_render(
            Arc::new(resolved.document),
            params.page,
            &options,
            Some(slice.clone()),
        )?;
        let task_id = self.register(TaskHandle::Render(handle), resolved.source_name, slice);
        Ok((task_id, "render"))
    }

    async fn process_start_reflow(
        &self,
        params: &StartReflowParams,
    ) -> crate::error::Result<(String, &'static str)> {
        let resolved = self
            .resolve_source(&params.source, params.password.as_deref())
            .await?;
        let document = resolved.document;
        let pages = params
            .pages
            .as_deref()
            .map(|range| parse_page_range(range, document.page_count()))
            .transpose()?;
        let mut options = ReflowOptions::default();
        if let Some(width) = params.line_width {
            options.line_width = width;
        }
        let slice = self.new_slice();
        let handle = self.library.start_reflow(
            Arc::new(document),
            pages.as_deref(),
            options,
            Some(slice.clone()),
        )?;
        let task_id = self.register(TaskHandle::Reflow(handle), resolved.source_name, slice);
        Ok((task_id, "reflow"))
    }

    async fn process_start_index(
        &self,
        params: &StartIndexParams,
    ) -> crate::error::Result<(String, &'static str)> {
        let resolved = self
            .resolve_source(&params.source, params.password.as_deref())
            .await?;
        let name = params
            .name
            .clone()
            .unwrap_or_else(|| resolved.source_name.clone());
        let slice = self.new_slice();
        let handle = self.library.start_index(
            &self.index,
            Arc::new(resolved.document),
            &name,
            Some(slice.clone()),
        )?;
        let task_id = self.register(TaskHandle::Index(handle), resolved.source_name, slice);
        Ok((task_id, "index"))
    }

    async fn process_continue_task(
        &self,
        params: &ContinueTaskParams,
    ) -> crate::error::Result<ContinueTaskResult> {
        let task = self
            .registry
            .get(&params.task_id)
            .ok_or_else(|| Error::TaskNotFound {
                id: params.task_id.clone(),
            })?;
        let budget = Duration::from_millis(self.slice_budget_ms(params.slice_ms));
        let task_id = params.task_id.clone();

        // One call per task at a time; a second call waits for its turn and
        // then arms its own slice
        let turn = Arc::clone(&task.turn).lock_owned().await;

        tokio::task::spawn_blocking(move || {
            let _turn = turn;
            task.slice.arm_for(budget);
            let (status, ratio) = task.handle.continue_progress_with_ratio();
            task.slice.disarm();

            let output = if status == ProgressState::Finished {
                Some(Self::collect_output(&task.handle)?)
            } else {
                None
            };

            Ok::<_, Error>(ContinueTaskResult {
                task_id,
                status: Some(status),
                ratio,
                output,
                error: (status == ProgressState::Error).then(|| "Task failed".to_string()),
            })
        })
        .await
        .map_err(|e| Error::Pdfium {
            reason: format!("Task join error: {}", e),
        })?
    }

    fn collect_output(handle: &TaskHandle) -> crate::error::Result<TaskOutput> {
        match handle {
            TaskHandle::Render(h) => h.with_task(|task| {
                let png = task.encode_png()?;
                let (width, height) = task.bitmap().dimensions();
                Ok(TaskOutput::Render {
                    page: task.page(),
                    width,
                    height,
                    mime_type: "image/png".to_string(),
                    data_base64: base64::engine::general_purpose::STANDARD.encode(png),
                })
            }),
            TaskHandle::Reflow(h) => Ok(h.with_task(|task| TaskOutput::Reflow {
                pages: task.pages().to_vec(),
            })),
            TaskHandle::Index(h) => Ok(h.with_task(|task| TaskOutput::Index {
                document: task.document_name().to_string(),
                pages_indexed: task.pages_indexed(),
                term_count: task.term_count(),
            })),
        }
    }

    fn process_search(&self, params: &SearchParams) -> SearchResult {
        let options = SearchOptions {
            case_sensitive: params.case_sensitive,
            max_results: params.max_results as usize,
            context_chars: params.context_chars as usize,
        };
        let index = self.index.read();
        let matches = index.search(&params.query, &options);
        SearchResult {
            query: params.query.clone(),
            documents: index.document_names(),
            total_matches: matches.len() as u32,
            matches,
        }
    }
}

impl Default for ProgressServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for ProgressServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Progressive document operations. start_render, start_reflow and start_index \
                 return a task_id; call continue_task repeatedly until the status is \
                 \"finished\" or \"error\", then release_task."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server without resource directories
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::default()).await
}

/// Run the MCP server with specified resource directories
pub async fn run_server_with_dirs(resource_dirs: Vec<String>) -> Result<()> {
    run_server_with_config(ServerConfig {
        resource_dirs,
        ..ServerConfig::default()
    })
    .await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    let server = ProgressServer::with_config(config);

    tracing::info!("Progressive MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
