use anyhow::{bail, Context, Result};
use design2code_sdk::GenerationContext;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::{workspace, Stages};
use crate::reply;
use crate::workflow::{StageUpdate, WorkflowState};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Recognized {
    Wrapped { components: Vec<String> },
    Bare(Vec<String>),
}

fn coder_system_prompt(knowledge: &BTreeMap<String, Value>, package: &str) -> String {
    let mut prompt = format!(
        "You are an expert Android developer writing Jetpack Compose UI.\n\
         Reproduce the design described by the Figma JSON as a single Kotlin file.\n\
         - The file starts with `{}`\n\
         - Exported bitmaps are referenced as R.drawable.<file name without extension>\n\
         - Provide a @Preview composable that renders the whole screen\n\
         Reply with the complete file only.",
        package
    );
    if !knowledge.is_empty() {
        prompt.push_str("\n\n# Component knowledge\n");
        for (name, entry) in knowledge {
            let text = serde_json::to_string_pretty(entry).unwrap_or_default();
            prompt.push_str(&format!("## {}\n```json\n{}\n```\n", name, text));
        }
    }
    prompt
}

async fn read_optional(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

impl Stages {
    /// Strip fences and anything in front of the package declaration
    fn clean_source(&self, reply: &str) -> String {
        let code = reply::extract_code_block(reply);
        reply::strip_before(&code, &self.config.coder.package_declaration)
    }

    async fn write_source(&self, workspace: &Path, source: &str) -> Result<()> {
        let path = workspace.join(&self.config.coder.source_file);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, source)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Source on disk, falling back to the last generated text
    pub(super) async fn current_source(&self, state: &WorkflowState) -> Result<String> {
        let workspace = workspace(state)?;
        match read_optional(&workspace.join(&self.config.coder.source_file)).await {
            Some(source) => Ok(source),
            None => state
                .source
                .clone()
                .context("No generated source in the workspace"),
        }
    }

    pub(super) async fn recognize_components(&self, state: &WorkflowState) -> Result<StageUpdate> {
        if self.knowledge.is_empty() {
            tracing::info!("Knowledge base is empty, skipping component recognition");
            return Ok(StageUpdate {
                components: Some(Vec::new()),
                ..Default::default()
            });
        }

        let document = state.document.as_ref().context("No design document")?;
        let names: Vec<&str> = self.knowledge.names().collect();
        let system_prompt = format!(
            "You are an expert UI designer and developer. Identify which of these \
             components are used in the design: {}.\n\
             Reply with JSON: {{\"components\": [\"<name>\", ...]}}",
            names.join(", ")
        );
        let prompt = format!("Figma JSON:\n{}", serde_json::to_string_pretty(document)?);
        let context = GenerationContext::new("recognize_components").with_system_prompt(system_prompt);

        let generator = self.collaborators.generator.clone();
        let recognized: Recognized = self
            .retrying("recognize_components", self.generation_policy(), move || {
                let generator = generator.clone();
                let prompt = prompt.clone();
                let context = context.clone();
                async move {
                    let text = generator.generate(&prompt, &context).await?;
                    reply::parse_json(&text)
                }
            })
            .await?;

        let components: BTreeSet<String> = match recognized {
            Recognized::Wrapped { components } | Recognized::Bare(components) => components,
        }
        .into_iter()
        .collect();
        tracing::info!("Recognized components: {:?}", components);

        Ok(StageUpdate {
            components: Some(components.into_iter().collect()),
            ..Default::default()
        })
    }

    pub(super) fn lookup_knowledge(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let knowledge = self.knowledge.select(&state.components);
        tracing::info!("Using knowledge for {} components", knowledge.len());
        Ok(StageUpdate {
            knowledge: Some(knowledge),
            ..Default::default()
        })
    }

    pub(super) async fn coder(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let document = state.document.as_ref().context("No design document")?;

        let mut prompt = format!(
            "# Figma JSON\n```json\n{}\n```\n",
            serde_json::to_string_pretty(document)?
        );
        if !state.assets.is_empty() {
            prompt.push_str(&format!(
                "\n# Icon List\nThe resource files in the {} directory are:\n",
                self.config.coder.asset_dir.display()
            ));
            for asset in &state.assets {
                if let Some(name) = asset.file_name() {
                    prompt.push_str(&format!("- {}\n", name.to_string_lossy()));
                }
            }
        }
        let context = GenerationContext::new("coder")
            .with_system_prompt(coder_system_prompt(
                &state.knowledge,
                &self.config.coder.package_declaration,
            ))
            .with_workspace(workspace);

        let attempts = self.config.coder.max_attempts.max(1);
        let delay = self.config.pool.policy().delay;
        let rules = self.config.routing_rules();
        let mut source = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(delay).await;
            }
            match self.collaborators.generator.generate(&prompt, &context).await {
                Ok(text) => {
                    let cleaned = self.clean_source(&text);
                    if rules.is_valid_source(&cleaned) {
                        source = Some(cleaned);
                        break;
                    }
                    tracing::info!("Generated code is not usable, attempt {}/{}", attempt, attempts);
                }
                Err(e) if e.is_rate_limited() => {
                    tracing::warn!("Code generation rate limited on attempt {}: {}", attempt, e);
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!("Code generation failed, attempt {}/{}: {}", attempt, attempts, e);
                }
            }
        }
        let Some(source) = source else {
            bail!("No valid source after {} attempts", attempts);
        };

        tracing::info!("Generated code:\n{}", source);
        self.write_source(workspace, &source).await?;
        Ok(StageUpdate {
            source: Some(source),
            ..Default::default()
        })
    }

    /// Point the screenshot test at the generated entry point
    pub(super) async fn replace_tester(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let test_path = workspace.join(&self.config.coder.test_file);
        let test_source = read_optional(&test_path).await.unwrap_or_default();
        let source = self.current_source(state).await?;

        let prompt = format!(
            "# {}\n```kotlin\n{}\n```\n\n# {}\n```kotlin\n{}\n```\n\
             Update `fun compose()` in the test so it renders the @Preview composable above. \
             The function signature may differ from the one currently tested.",
            self.config.coder.source_file.display(),
            source,
            self.config.coder.test_file.display(),
            test_source
        );
        let context = GenerationContext::new("replace_tester")
            .with_system_prompt("You are an expert Android developer. Reply with the complete updated test file only.")
            .with_workspace(workspace);

        let generator = self.collaborators.generator.clone();
        let updated = self
            .retrying("replace_tester", self.generation_policy(), move || {
                let generator = generator.clone();
                let prompt = prompt.clone();
                let context = context.clone();
                async move {
                    let text = generator.generate(&prompt, &context).await?;
                    anyhow::Ok(reply::extract_code_block(&text))
                }
            })
            .await?;

        if updated.is_empty() {
            tracing::warn!("Tester reply was empty, keeping {}", test_path.display());
        } else {
            if let Some(dir) = test_path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&test_path, &updated)
                .await
                .with_context(|| format!("Failed to write {}", test_path.display()))?;
            tracing::info!("Updated {}", test_path.display());
        }
        Ok(StageUpdate::none())
    }

    /// Repair the source from the last compile or preview error
    pub(super) async fn bugfix(&self, state: &WorkflowState) -> Result<StageUpdate> {
        let workspace = workspace(state)?;
        let source = self.current_source(state).await?;
        let problem = match (state.last_stage, state.last_error()) {
            (Some(stage), Some(error)) => format!("The {} step failed with:\n{}", stage, error),
            _ => "Go on fixing the current issue, and make sure the code is complete, \
                  free of syntax errors and runnable."
                .to_string(),
        };
        tracing::info!("Fixing after {:?}", state.last_stage);

        let prompt = format!("# Current source\n```kotlin\n{}\n```\n\n{}", source, problem);
        let context = GenerationContext::new("bugfix")
            .with_system_prompt(format!(
                "You fix Jetpack Compose code so it compiles and renders. Keep `{}` and the \
                 @Preview composable. Reply with the complete fixed file only.",
                self.config.coder.package_declaration
            ))
            .with_workspace(workspace);

        let generator = self.collaborators.generator.clone();
        let package = self.config.coder.package_declaration.clone();
        let fixed = self
            .retrying("bugfix", self.generation_policy(), move || {
                let generator = generator.clone();
                let prompt = prompt.clone();
                let context = context.clone();
                let package = package.clone();
                async move {
                    let text = generator.generate(&prompt, &context).await?;
                    let code = reply::strip_before(&reply::extract_code_block(&text), &package);
                    if code.trim().is_empty() {
                        bail!("Bugfix reply contained no code");
                    }
                    anyhow::Ok(code)
                }
            })
            .await?;

        self.write_source(workspace, &fixed).await?;
        Ok(StageUpdate {
            source: Some(fixed),
            ..Default::default()
        })
    }
}
