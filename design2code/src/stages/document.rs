use anyhow::{Context, Result};
use design2code_sdk::{DesignRef, TaskStatus};

use super::Stages;
use crate::partition::prune;
use crate::registry::TaskUpdate;
use crate::workflow::{StageUpdate, WorkflowState};

impl Stages {
    pub(super) async fn export_document(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let reference = DesignRef::parse(&state.design_url)?;
        tracing::info!(
            "Exporting node {} of file {}",
            reference.api_node_id(),
            reference.file_key
        );

        let design = self.collaborators.design.clone();
        let job_ref = reference.clone();
        let credential = state.credential.clone();
        let fetched = self
            .retrying("fetch_document", self.config.pool.policy(), move || {
                let design = design.clone();
                let reference = job_ref.clone();
                let credential = credential.clone();
                async move {
                    let fetched = design.fetch_document(&reference, &credential).await?;
                    anyhow::Ok(fetched)
                }
            })
            .await
            .context("Failed to fetch the design document")?;

        let document = prune(&fetched.root);
        tracing::info!(
            "Pruned design from {} to {} nodes",
            fetched.root.node_count(),
            document.node_count()
        );

        let title = fetched.title.unwrap_or_else(|| reference.title.clone());
        self.registry.update(
            state.task_id,
            TaskUpdate::status(TaskStatus::Running).with_page_title(title.clone()),
        );

        Ok(StageUpdate {
            design_ref: Some(reference),
            page_title: Some(title),
            document: Some(document),
            ..Default::default()
        })
    }

    pub(super) async fn init_workspace(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let dir = self.config.workspace_dir(state.task_id);
        if dir.exists() {
            tracing::warn!("Removing stale workspace {}", dir.display());
            tokio::fs::remove_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.config.output_dir.display()))?;

        self.collaborators
            .toolchain
            .prepare(&dir)
            .await
            .context("Failed to prepare the workspace")?;

        for sub in [&self.config.coder.asset_dir, &self.config.coder.screenshot_dir] {
            let path = dir.join(sub);
            tokio::fs::create_dir_all(&path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
        }
        tracing::info!("Workspace ready at {}", dir.display());

        Ok(StageUpdate {
            workspace: Some(dir),
            ..Default::default()
        })
    }
}
