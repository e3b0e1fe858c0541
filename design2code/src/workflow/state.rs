//! The record threaded through every stage of a run

use design2code_sdk::{BuildOutcome, DesignNode, DesignRef, PreviewOutcome};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use super::stage::Stage;
use crate::error::{PipelineError, PipelineResult};

/// State of one task's run
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub task_id: i64,
    pub design_url: String,
    pub credential: String,

    pub design_ref: Option<DesignRef>,
    pub page_title: Option<String>,
    /// Pruned design tree
    pub document: Option<DesignNode>,

    pub workspace: Option<PathBuf>,
    /// Exported bitmaps, relative to the workspace
    pub assets: BTreeSet<PathBuf>,
    pub reference_screenshot: Option<PathBuf>,
    pub runtime_screenshot: Option<PathBuf>,

    pub components: Vec<String>,
    pub knowledge: BTreeMap<String, Value>,

    /// Source currently on disk in the workspace
    pub source: Option<String>,
    pub compile: Option<BuildOutcome>,
    pub preview: Option<PreviewOutcome>,
    pub scores: Option<BTreeMap<String, f64>>,

    /// Last stage that completed, set by the engine
    pub last_stage: Option<Stage>,
    pub archive: Option<PathBuf>,
}

impl WorkflowState {
    pub fn new(task_id: i64, design_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            task_id,
            design_url: design_url.into(),
            credential: credential.into(),
            ..Default::default()
        }
    }

    /// Error text of the most recent failed build step, if any
    pub fn last_error(&self) -> Option<&str> {
        match self.last_stage {
            Some(Stage::Preview) => self.preview.as_ref().and_then(PreviewOutcome::error),
            Some(Stage::Compile) => self.compile.as_ref().and_then(BuildOutcome::error),
            _ => None,
        }
    }

    /// Validate `update` and merge the fields it carries
    pub fn apply(&mut self, stage: Stage, update: StageUpdate) -> PipelineResult<()> {
        update.validate(stage, self)?;

        let StageUpdate {
            design_ref,
            page_title,
            document,
            workspace,
            assets,
            reference_screenshot,
            runtime_screenshot,
            components,
            knowledge,
            source,
            compile,
            preview,
            scores,
            archive,
        } = update;

        if design_ref.is_some() {
            self.design_ref = design_ref;
        }
        if page_title.is_some() {
            self.page_title = page_title;
        }
        if document.is_some() {
            self.document = document;
        }
        if workspace.is_some() {
            self.workspace = workspace;
        }
        if let Some(assets) = assets {
            self.assets = assets;
        }
        if reference_screenshot.is_some() {
            self.reference_screenshot = reference_screenshot;
        }
        if runtime_screenshot.is_some() {
            self.runtime_screenshot = runtime_screenshot;
        }
        if let Some(components) = components {
            self.components = components;
        }
        if let Some(knowledge) = knowledge {
            self.knowledge = knowledge;
        }
        if source.is_some() {
            self.source = source;
        }
        if compile.is_some() {
            self.compile = compile;
        }
        if preview.is_some() {
            self.preview = preview;
        }
        if scores.is_some() {
            self.scores = scores;
        }
        if archive.is_some() {
            self.archive = archive;
        }
        Ok(())
    }
}

/// Partial state produced by one stage; `None` fields are left alone
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub design_ref: Option<DesignRef>,
    pub page_title: Option<String>,
    pub document: Option<DesignNode>,
    pub workspace: Option<PathBuf>,
    pub assets: Option<BTreeSet<PathBuf>>,
    pub reference_screenshot: Option<PathBuf>,
    pub runtime_screenshot: Option<PathBuf>,
    pub components: Option<Vec<String>>,
    pub knowledge: Option<BTreeMap<String, Value>>,
    pub source: Option<String>,
    pub compile: Option<BuildOutcome>,
    pub preview: Option<PreviewOutcome>,
    pub scores: Option<BTreeMap<String, f64>>,
    pub archive: Option<PathBuf>,
}

impl StageUpdate {
    pub fn none() -> Self {
        Self::default()
    }

    fn validate(&self, stage: Stage, state: &WorkflowState) -> PipelineResult<()> {
        let invalid = |reason: &str| PipelineError::InvalidUpdate {
            stage,
            reason: reason.to_string(),
        };

        let has_workspace = self.workspace.is_some() || state.workspace.is_some();
        if (self.compile.is_some() || self.preview.is_some()) && !has_workspace {
            return Err(invalid("build outcome recorded before a workspace exists"));
        }
        if let Some(BuildOutcome::Failed { error }) = &self.compile {
            if error.trim().is_empty() {
                return Err(invalid("failed compile carries no error text"));
            }
        }
        if let Some(PreviewOutcome::Failed { error }) = &self.preview {
            if error.trim().is_empty() {
                return Err(invalid("failed preview carries no error text"));
            }
        }
        if let Some(scores) = &self.scores {
            if let Some((name, _)) = scores.iter().find(|(_, score)| !score.is_finite()) {
                return Err(invalid(&format!("score {} is not a finite number", name)));
            }
        }
        Ok(())
    }
}
