//! Gradle based build and screenshot tool-chain

use async_trait::async_trait;
use design2code_sdk::{BuildOutcome, CollaboratorError, PreviewOutcome, Toolchain};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::ToolchainConfig;

pub struct GradleToolchain {
    template_repo: String,
    compile_task: String,
    preview_task: String,
    preview_screenshot: PathBuf,
}

/// Exit status and captured streams of a finished command
struct Run {
    success: bool,
    stdout: String,
    stderr: String,
}

async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<Run, CollaboratorError> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| CollaboratorError::Process {
            program: program.to_string(),
            message: format!("failed to start in {}: {}", cwd.display(), e),
        })?;
    Ok(Run {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

impl GradleToolchain {
    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self {
            template_repo: config.template_repo.clone(),
            compile_task: config.compile_task.clone(),
            preview_task: config.preview_task.clone(),
            preview_screenshot: config.preview_screenshot.clone(),
        }
    }

    async fn gradle(&self, task: &str, workspace: &Path) -> Result<Run, CollaboratorError> {
        tracing::info!("Running ./gradlew {} in {}", task, workspace.display());
        // gradlew may be checked out without its exec bit
        let result = run("sh", &["gradlew", task], workspace).await?;
        if result.success {
            tracing::debug!("{}", result.stdout);
        } else {
            tracing::info!("./gradlew {} failed: {}", task, result.stderr);
        }
        Ok(result)
    }
}

#[async_trait]
impl Toolchain for GradleToolchain {
    async fn prepare(&self, workspace: &Path) -> Result<(), CollaboratorError> {
        if self.template_repo.is_empty() {
            return Err(CollaboratorError::Process {
                program: "git".to_string(),
                message: "no template repository configured".to_string(),
            });
        }
        let target = workspace.to_string_lossy().into_owned();
        let parent = workspace.parent().unwrap_or(workspace);
        tracing::info!("Cloning template {} into {}", self.template_repo, target);
        let clone = run("git", &["clone", "--depth", "1", &self.template_repo, &target], parent).await?;
        if !clone.success {
            return Err(CollaboratorError::Process {
                program: "git".to_string(),
                message: clone.stderr,
            });
        }

        // Warm the build once so later compiles only report our own errors
        let warm = self.gradle(&self.compile_task, workspace).await?;
        if !warm.success {
            return Err(CollaboratorError::Process {
                program: "./gradlew".to_string(),
                message: warm.stderr,
            });
        }
        Ok(())
    }

    async fn compile(&self, workspace: &Path) -> Result<BuildOutcome, CollaboratorError> {
        let result = self.gradle(&self.compile_task, workspace).await?;
        Ok(if result.success {
            BuildOutcome::Passed
        } else {
            BuildOutcome::Failed {
                error: non_empty(result.stderr, "compile failed without output"),
            }
        })
    }

    async fn preview(&self, workspace: &Path) -> Result<PreviewOutcome, CollaboratorError> {
        let result = self.gradle(&self.preview_task, workspace).await?;
        Ok(if result.success {
            PreviewOutcome::Passed {
                screenshot: workspace.join(&self.preview_screenshot),
            }
        } else {
            PreviewOutcome::Failed {
                error: non_empty(result.stderr, "preview failed without output"),
            }
        })
    }
}

fn non_empty(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}
