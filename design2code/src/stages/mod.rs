//! Stage bodies of the design-to-code pipeline
//!
//! - **document**: fetch and prune the design, prepare the workspace
//! - **assets**: export bitmaps and the reference screenshot, drop unused ones
//! - **code**: component knowledge, code generation, test harness and repairs
//! - **build**: compile, preview and visual evaluation
//! - **finalize**: store and package the result

mod assets;
mod build;
mod code;
mod document;
mod finalize;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::collaborators::{Collaborators, KnowledgeBase};
use crate::config::PipelineConfig;
use crate::registry::TaskRegistry;
use crate::retry_pool::{RetryPolicy, RetryPool};
use crate::workflow::{Stage, StageExecutor, StageUpdate, WorkflowState};

pub use assets::{safe_file_name, used_drawables};

/// Executes every stage against a set of collaborators
pub struct Stages {
    registry: TaskRegistry,
    collaborators: Collaborators,
    config: Arc<PipelineConfig>,
    knowledge: Arc<KnowledgeBase>,
}

impl Stages {
    pub fn new(
        registry: TaskRegistry,
        collaborators: Collaborators,
        config: Arc<PipelineConfig>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            registry,
            collaborators,
            config,
            knowledge,
        }
    }

    /// Retry policy for model calls: the coder's attempt budget
    fn generation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.coder.max_attempts as u32,
            self.config.pool.policy().delay,
        )
    }

    /// Run a single job through a one-wide pool under `policy`
    async fn retrying<F, Fut, T>(&self, name: &str, policy: RetryPolicy, job: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let pool = RetryPool::new(1, policy);
        let result = pool.submit(name, job).join().await;
        pool.shutdown().await;
        result
    }
}

fn workspace(state: &WorkflowState) -> Result<&Path> {
    state
        .workspace
        .as_deref()
        .context("Workspace has not been initialised")
}

#[async_trait]
impl StageExecutor for Stages {
    async fn execute(&self, stage: Stage, state: &WorkflowState) -> Result<StageUpdate> {
        match stage {
            Stage::ExportDocument => self.export_document(state).await,
            Stage::InitWorkspace => self.init_workspace(state).await,
            Stage::ExportAssets => self.export_assets(state).await,
            Stage::CaptureScreenshot => self.capture_screenshot(state).await,
            Stage::RecognizeComponents => self.recognize_components(state).await,
            Stage::LookupKnowledge => self.lookup_knowledge(state),
            Stage::Coder => self.coder(state).await,
            Stage::ReplaceTester => self.replace_tester(state).await,
            Stage::Compile => self.compile(state).await,
            Stage::Bugfix => self.bugfix(state).await,
            Stage::Preview => self.preview(state).await,
            Stage::Cleanup => self.cleanup(state).await,
            Stage::Evaluate => self.evaluate(state).await,
            Stage::Finalize => self.finalize(state).await,
        }
    }
}
