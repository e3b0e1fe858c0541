//! Generative model driven through an external program
//!
//! The prompt goes to the program's stdin and the reply is read from stdout.
//! Context travels as JSON in the `D2C_CONTEXT` environment variable.

use async_trait::async_trait;
use design2code_sdk::{CollaboratorError, GenerationContext, Generator};
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::GeneratorConfig;

const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

fn context_json(context: &GenerationContext) -> String {
    json!({
        "purpose": context.purpose,
        "system_prompt": context.system_prompt,
        "workspace": context.workspace,
        "attachments": context.attachments,
    })
    .to_string()
}

fn looks_rate_limited(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("rate limit") || lower.contains("429")
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(
        &self,
        prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, CollaboratorError> {
        tracing::info!("Calling generator for {} ({} prompt bytes)", context.purpose, prompt.len());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("D2C_CONTEXT", context_json(context))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workspace) = &context.workspace {
            cmd.current_dir(workspace);
        }

        let mut child = cmd.spawn().map_err(|e| CollaboratorError::Process {
            program: self.program.clone(),
            message: format!("failed to start: {}", e),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if looks_rate_limited(&stderr) {
                return Err(CollaboratorError::RateLimited {
                    retry_after: RATE_LIMIT_BACKOFF,
                });
            }
            return Err(CollaboratorError::Process {
                program: self.program.clone(),
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
