//! Shared contracts for design2code pipelines.
//!
//! Everything a pipeline host and its collaborators need to agree on lives here:
//! task status codes, the design tree model, the collaborator traits the core
//! calls out to, and the structured events a running pipeline emits.

pub mod design;

pub use design::{BoundingBox, DesignNode, DesignRef, LayoutHints, Paint};

// Re-export async trait for convenience
pub use async_trait::async_trait;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lifecycle status of a submitted task
///
/// The numeric codes are stable and shared with status consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Creating,
    CreateFail,
    Running,
    Succeeded,
    /// Stopped by the owner
    Stop,
    /// Stopped by an administrator
    AdminStop,
    Failed,
    /// Task does not exist or is not visible to the caller
    Unknown,
}

impl TaskStatus {
    pub fn code(self) -> u8 {
        match self {
            TaskStatus::Creating => 0,
            TaskStatus::CreateFail => 1,
            TaskStatus::Running => 2,
            TaskStatus::Succeeded => 3,
            TaskStatus::Stop => 4,
            TaskStatus::AdminStop => 5,
            TaskStatus::Failed => 6,
            TaskStatus::Unknown => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            0 => TaskStatus::Creating,
            1 => TaskStatus::CreateFail,
            2 => TaskStatus::Running,
            3 => TaskStatus::Succeeded,
            4 => TaskStatus::Stop,
            5 => TaskStatus::AdminStop,
            6 => TaskStatus::Failed,
            7 => TaskStatus::Unknown,
            _ => return None,
        };
        Some(status)
    }

    /// Counts against the per-owner running limit
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Creating | TaskStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::CreateFail
                | TaskStatus::Succeeded
                | TaskStatus::Stop
                | TaskStatus::AdminStop
                | TaskStatus::Failed
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskStatus::Creating => "Creating",
            TaskStatus::CreateFail => "CreateFail",
            TaskStatus::Running => "Running",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Stop => "Stop",
            TaskStatus::AdminStop => "AdminStop",
            TaskStatus::Failed => "Failed",
            TaskStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Errors raised by external collaborators
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// The remote side asked us to slow down. Always retriable.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid design reference: {0}")]
    InvalidReference(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{program} failed: {message}")]
    Process { program: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CollaboratorError::RateLimited { .. })
    }
}

/// Result of a compile run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BuildOutcome {
    Passed,
    Failed { error: String },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Passed)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BuildOutcome::Passed => None,
            BuildOutcome::Failed { error } => Some(error),
        }
    }
}

/// Result of a preview (screenshot recording) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PreviewOutcome {
    Passed { screenshot: PathBuf },
    Failed { error: String },
}

impl PreviewOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PreviewOutcome::Passed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PreviewOutcome::Passed { .. } => None,
            PreviewOutcome::Failed { error } => Some(error),
        }
    }

    pub fn screenshot(&self) -> Option<&Path> {
        match self {
            PreviewOutcome::Passed { screenshot } => Some(screenshot),
            PreviewOutcome::Failed { .. } => None,
        }
    }
}

/// A fetched design document with its page title
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub title: Option<String>,
    pub root: DesignNode,
}

/// Source of design documents and their rendered assets
#[async_trait]
pub trait DesignSource: Send + Sync {
    /// Fetch the node tree a reference points at
    async fn fetch_document(
        &self,
        reference: &DesignRef,
        credential: &str,
    ) -> Result<FetchedDocument, CollaboratorError>;

    /// Resolve download links for rendered nodes (node id -> url)
    async fn fetch_asset_links(
        &self,
        file_key: &str,
        ids: &[String],
        credential: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError>;

    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, CollaboratorError>;
}

/// Extra information handed to a generator alongside the prompt
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    /// What the call is for (e.g. "coder", "bugfix"), used for logging
    pub purpose: String,
    pub system_prompt: Option<String>,
    pub workspace: Option<PathBuf>,
    /// Files the generator may look at (screenshots, sources)
    pub attachments: Vec<PathBuf>,
}

impl GenerationContext {
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }
}

/// Generative model used for classification, code generation and repair
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, CollaboratorError>;
}

/// Build and preview tool-chain operating on a task workspace
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Populate a fresh workspace with the project template
    async fn prepare(&self, workspace: &Path) -> Result<(), CollaboratorError>;

    async fn compile(&self, workspace: &Path) -> Result<BuildOutcome, CollaboratorError>;

    async fn preview(&self, workspace: &Path) -> Result<PreviewOutcome, CollaboratorError>;
}

/// Visual comparison of a reference image against the rendered result
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Per-criterion scores
    async fn evaluate(
        &self,
        reference: &Path,
        actual: &Path,
    ) -> Result<BTreeMap<String, f64>, CollaboratorError>;
}

// ============================================================================
// Structured pipeline events
// ============================================================================

/// Prefix marking an event line inside a task log
pub const EVENT_PREFIX: &str = "__D2C_EVENT__:";

/// Structured events emitted while a task runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        task_id: i64,
        stage: String,
        /// 1-based visit count of this stage within the task
        attempt: usize,
    },
    StageCompleted {
        task_id: i64,
        stage: String,
    },
    StageFailed {
        task_id: i64,
        stage: String,
        error: String,
    },
    /// A pool job failed and is going to be retried
    JobRetried {
        job: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    TaskFinished {
        task_id: i64,
        status: TaskStatus,
    },
}

impl PipelineEvent {
    /// Render as a single prefixed JSON line
    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self)
            .ok()
            .map(|json| format!("{}{}", EVENT_PREFIX, json))
    }

    /// Parse a line produced by [`PipelineEvent::to_line`]
    pub fn from_line(line: &str) -> Option<Self> {
        let start = line.find(EVENT_PREFIX)?;
        serde_json::from_str(&line[start + EVENT_PREFIX.len()..]).ok()
    }

    /// Emit through the current tracing dispatcher
    pub fn emit(&self) {
        if let Some(line) = self.to_line() {
            tracing::info!(target: "design2code::event", "{}", line);
        }
    }
}

#[macro_export]
macro_rules! log_stage_start {
    ($task_id:expr, $stage:expr, $attempt:expr) => {
        $crate::PipelineEvent::StageStarted {
            task_id: $task_id,
            stage: $stage.to_string(),
            attempt: $attempt,
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_stage_complete {
    ($task_id:expr, $stage:expr) => {
        $crate::PipelineEvent::StageCompleted {
            task_id: $task_id,
            stage: $stage.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_stage_failed {
    ($task_id:expr, $stage:expr, $error:expr) => {
        $crate::PipelineEvent::StageFailed {
            task_id: $task_id,
            stage: $stage.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_job_retry {
    ($job:expr, $attempt:expr, $max:expr, $error:expr) => {
        $crate::PipelineEvent::JobRetried {
            job: $job.to_string(),
            attempt: $attempt,
            max_attempts: $max,
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_finished {
    ($task_id:expr, $status:expr) => {
        $crate::PipelineEvent::TaskFinished {
            task_id: $task_id,
            status: $status,
        }
        .emit();
    };
}
