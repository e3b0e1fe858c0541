use anyhow::{Context, Result};
use design2code_sdk::PreviewOutcome;

use super::{workspace, Stages};
use crate::workflow::{StageUpdate, WorkflowState};

impl Stages {
    pub(super) async fn compile(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let outcome = self.collaborators.toolchain.compile(workspace).await?;
        match outcome.error() {
            None => tracing::info!("Compile succeeded"),
            Some(error) => tracing::info!("Compile failed:\n{}", error),
        }
        Ok(StageUpdate {
            compile: Some(outcome),
            ..Default::default()
        })
    }

    pub(super) async fn preview(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let outcome = self.collaborators.toolchain.preview(workspace).await?;
        let runtime_screenshot = match &outcome {
            PreviewOutcome::Passed { screenshot } => {
                tracing::info!("Preview recorded {}", screenshot.display());
                Some(screenshot.clone())
            }
            PreviewOutcome::Failed { error } => {
                tracing::info!("Preview failed:\n{}", error);
                None
            }
        };
        Ok(StageUpdate {
            preview: Some(outcome),
            runtime_screenshot,
            ..Default::default()
        })
    }

    pub(super) async fn evaluate(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let reference = state
            .reference_screenshot
            .clone()
            .context("No design screenshot to evaluate against")?;
        let runtime = state
            .runtime_screenshot
            .clone()
            .context("No runtime screenshot, preview has not succeeded")?;

        let evaluator = self.collaborators.evaluator.clone();
        let scores = self
            .retrying("evaluate", self.config.pool.policy(), move || {
                let evaluator = evaluator.clone();
                let reference = reference.clone();
                let runtime = runtime.clone();
                async move {
                    let scores = evaluator.evaluate(&reference, &runtime).await?;
                    anyhow::Ok(scores)
                }
            })
            .await?;
        tracing::info!("Evaluation result: {:?}", scores);

        Ok(StageUpdate {
            scores: Some(scores),
            ..Default::default()
        })
    }
}
