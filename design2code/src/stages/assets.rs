use anyhow::{bail, Context, Result};
use design2code_sdk::{DesignNode, GenerationContext, Generator};
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{workspace, Stages};
use crate::partition::{collect_image_assets, Partitioner};
use crate::reply;
use crate::retry_pool::RetryPool;
use crate::workflow::{StageUpdate, WorkflowState};

const CLASSIFY_PROMPT: &str = "You find icons in a UI design tree. Return the nodes that \
should be exported as bitmaps (icons, illustrations, logos) rather than rebuilt as layout. \
Prefer the icon's parent when it carries the icon's padding or shadow. Reply with JSON: \
{\"icons\": [{\"figma_node_id\": \"<id>\", \"icon_file_name\": \"ic_<snake_case_name>\"}]}";

/// One node the model wants exported as a bitmap
#[derive(Debug, Clone, Deserialize)]
struct IconExport {
    #[serde(alias = "figma_node_id")]
    node_id: String,
    #[serde(alias = "icon_file_name")]
    file_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Classification {
    Wrapped { icons: Vec<IconExport> },
    Bare(Vec<IconExport>),
}

impl Classification {
    fn into_icons(self) -> Vec<IconExport> {
        match self {
            Classification::Wrapped { icons } | Classification::Bare(icons) => icons,
        }
    }
}

/// Collapse runs of path separators, `*` and spaces into `_`
pub fn safe_file_name(raw: &str) -> String {
    let mut safe = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.chars() {
        if matches!(c, '/' | '\\' | '*' | ' ') {
            if !in_run {
                safe.push('_');
            }
            in_run = true;
        } else {
            safe.push(c);
            in_run = false;
        }
    }
    if safe != raw {
        tracing::info!("Renamed asset {:?} to {:?}", raw, safe);
    }
    safe
}

/// Drawables referenced from Kotlin source as `R.drawable.<name>`
pub fn used_drawables(source: &str) -> Result<BTreeSet<String>> {
    let pattern = Regex::new(r"R\.drawable\.([a-zA-Z0-9_]+)")?;
    Ok(pattern
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect())
}

/// `dir/<stem>.png`, suffixed `_1`, `_2`, ... until it does not exist
fn unique_png(dir: &Path, stem: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{}.png", stem));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.png", stem, counter));
        counter += 1;
    }
    candidate
}

fn screenshot_name(task_id: i64) -> String {
    format!("figma_screenshot_{}", task_id)
}

async fn classify(generator: &dyn Generator, node: &DesignNode) -> Result<Vec<IconExport>> {
    let node_json = serde_json::to_string_pretty(node)?;
    let prompt = format!("Node JSON:\n```json\n{}\n```", node_json);
    let context = GenerationContext::new("classify").with_system_prompt(CLASSIFY_PROMPT);
    let text = generator.generate(&prompt, &context).await?;
    let classification: Classification = reply::parse_json(&text)?;
    Ok(classification.into_icons())
}

impl Stages {
    pub(super) async fn export_assets(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let document = state.document.as_ref().context("No design document to export from")?;
        let reference = state.design_ref.as_ref().context("No design reference")?;

        // Classify every fragment; jobs are paced to stay under the model's rate limit
        let partition = Partitioner::new(self.config.partition.split_divisor).partition(document);
        tracing::info!("Split design into {} fragments", partition.len());
        let pool = RetryPool::for_batch(&self.config.pool, partition.len());
        let pacing = self.config.partition.pacing();
        let mut handles = Vec::with_capacity(partition.len());
        for (index, fragment) in partition.into_entries().into_iter().enumerate() {
            if index > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            tracing::info!(
                "Classifying fragment {}: type={}, name={}",
                fragment.id,
                fragment.node.node_type,
                fragment.node.name
            );
            let generator = self.collaborators.generator.clone();
            let node = Arc::new(fragment.node);
            handles.push(pool.submit(format!("classify {}", fragment.id), move || {
                let generator = generator.clone();
                let node = node.clone();
                async move { classify(generator.as_ref(), &node).await }
            }));
        }
        let results = join_all(handles.into_iter().map(|handle| handle.join())).await;
        pool.shutdown().await;

        let mut exports: BTreeMap<String, String> = BTreeMap::new();
        for result in results {
            for icon in result.context("Fragment classification failed")? {
                exports.insert(icon.node_id, icon.file_name);
            }
        }
        exports.insert(reference.api_node_id(), screenshot_name(state.task_id));
        exports.extend(collect_image_assets(document));
        tracing::info!("Exporting {} nodes as bitmaps", exports.len());

        let ids: Vec<String> = exports.keys().cloned().collect();
        let links = match self
            .collaborators
            .design
            .fetch_asset_links(&reference.file_key, &ids, &state.credential)
            .await
        {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!("Could not resolve asset links, skipping downloads: {}", e);
                HashMap::new()
            }
        };

        let asset_dir = workspace.join(&self.config.coder.asset_dir);
        let mut assets = state.assets.clone();
        for (name, bytes) in self.download_all(&exports, links).await {
            let stem = safe_file_name(&name);
            let path = unique_png(&asset_dir, &stem);
            if let Err(e) = tokio::fs::write(&path, &bytes).await {
                tracing::warn!("Failed to save asset {}: {}", path.display(), e);
                continue;
            }
            if let Ok(relative) = path.strip_prefix(workspace) {
                assets.insert(relative.to_path_buf());
            }
        }
        tracing::info!("Exported assets: {:?}", assets);

        Ok(StageUpdate {
            assets: Some(assets),
            ..Default::default()
        })
    }

    /// Download every linked export; failures are logged and skipped
    async fn download_all(
        &self,
        exports: &BTreeMap<String, String>,
        links: HashMap<String, String>,
    ) -> Vec<(String, Vec<u8>)> {
        let mut jobs = Vec::new();
        for (id, name) in exports {
            match links.get(id) {
                Some(url) => jobs.push((name.clone(), url.clone())),
                None => tracing::warn!("No image link for node {} ({})", id, name),
            }
        }

        let pool = RetryPool::for_batch(&self.config.pool, jobs.len());
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(name, url)| {
                let design = self.collaborators.design.clone();
                let job_url = url.clone();
                let handle = pool.submit(format!("download {}", name), move || {
                    let design = design.clone();
                    let url = job_url.clone();
                    async move {
                        let bytes = design.download_asset(&url).await?;
                        anyhow::Ok(bytes)
                    }
                });
                (name, url, handle)
            })
            .collect();

        let mut downloaded = Vec::new();
        for (name, url, handle) in handles {
            match handle.join().await {
                Ok(bytes) => downloaded.push((name, bytes)),
                Err(e) => tracing::warn!("Skipping asset {} from {}: {:#}", name, url, e),
            }
        }
        pool.shutdown().await;
        downloaded
    }

    pub(super) async fn capture_screenshot(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let file_name = format!("{}.png", screenshot_name(state.task_id));
        let shot_dir = workspace.join(&self.config.coder.screenshot_dir);
        let target = shot_dir.join(&file_name);
        let mut assets = state.assets.clone();

        if target.is_file() {
            tracing::info!("Screenshot already present at {}", target.display());
        } else {
            tokio::fs::create_dir_all(&shot_dir).await?;
            let exported = self.config.coder.asset_dir.join(&file_name);
            if workspace.join(&exported).is_file() {
                tracing::info!("Moving exported screenshot {} to {}", exported.display(), target.display());
                tokio::fs::rename(workspace.join(&exported), &target)
                    .await
                    .with_context(|| format!("Failed to move {}", exported.display()))?;
                assets.remove(&exported);
            } else {
                let bytes = self.download_screenshot(state).await?;
                tokio::fs::write(&target, bytes)
                    .await
                    .with_context(|| format!("Failed to save {}", target.display()))?;
                tracing::info!("Saved screenshot to {}", target.display());
            }
        }

        Ok(StageUpdate {
            reference_screenshot: Some(target),
            assets: Some(assets),
            ..Default::default()
        })
    }

    async fn download_screenshot(&self, state: &WorkflowState) -> Result<Vec<u8>> {
        let reference = state.design_ref.clone().context("No design reference")?;
        let node_id = reference.api_node_id();
        tracing::info!("No local screenshot, downloading node {}", node_id);

        let design = self.collaborators.design.clone();
        let credential = state.credential.clone();
        self.retrying("download_screenshot", self.config.pool.policy(), move || {
            let design = design.clone();
            let reference = reference.clone();
            let credential = credential.clone();
            let node_id = node_id.clone();
            async move {
                let links = design
                    .fetch_asset_links(&reference.file_key, &[node_id.clone()], &credential)
                    .await?;
                let Some(url) = links.get(&node_id) else {
                    bail!("No screenshot link for node {}", node_id);
                };
                let bytes = design.download_asset(url).await?;
                anyhow::Ok(bytes)
            }
        })
        .await
        .context("Failed to download the design screenshot")
    }

    /// Delete exported assets the generated source never references
    pub(super) async fn cleanup(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let source = self.current_source(state).await?;
        let used = used_drawables(&source)?;

        let mut kept = BTreeSet::new();
        for asset in &state.assets {
            let stem = asset.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if used.contains(stem) {
                kept.insert(asset.clone());
                continue;
            }
            let path = workspace.join(asset);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!("Removed unused asset {}", asset.display()),
                Err(e) => tracing::info!("Unused asset {} not removed: {}", path.display(), e),
            }
        }

        Ok(StageUpdate {
            assets: Some(kept),
            ..Default::default()
        })
    }
}
