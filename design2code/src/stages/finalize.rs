use anyhow::{Context, Result};
use design2code_sdk::TaskStatus;

use super::assets::safe_file_name;
use super::{workspace, Stages};
use crate::workflow::{StageUpdate, WorkflowState};

impl Stages {
    /// Store the code, package the workspace and mark the task done
    pub(super) async fn finalize(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let task_id = state.task_id;

        let source = self.current_source(state).await?;
        self.registry.set_output(task_id, source);

        let log = self.config.log_path(task_id);
        if log.is_file() {
            let copy = workspace.join(format!("{}.log", task_id));
            if let Err(e) = tokio::fs::copy(&log, &copy).await {
                tracing::warn!("Could not copy the task log into the package: {}", e);
            }
        }

        let title = state
            .page_title
            .clone()
            .or_else(|| state.design_ref.as_ref().map(|r| r.title.clone()))
            .unwrap_or_else(|| "design".to_string());
        let archive = self
            .config
            .output_dir
            .join(format!("{}_{}.zip", safe_file_name(&title), task_id));
        self.collaborators
            .packager
            .package(workspace, &archive)
            .await
            .context("Failed to package the workspace")?;
        tracing::info!("Packaged result at {}", archive.display());

        self.registry
            .complete(task_id, TaskStatus::Succeeded, archive.display().to_string());

        if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
            tracing::warn!("Could not release workspace {}: {}", workspace.display(), e);
        }

        Ok(StageUpdate {
            archive: Some(archive),
            ..Default::default()
        })
    }
}
