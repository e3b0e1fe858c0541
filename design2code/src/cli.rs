//! Command-line interface
//!
//! - `run`: push one design link through the whole pipeline and report
//! - `partition`: prune and split a design JSON file offline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use design2code_sdk::DesignNode;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collaborators::{Collaborators, KnowledgeBase};
use crate::config::PipelineConfig;
use crate::partition::{prune, Partitioner};
use crate::registry::TaskRegistry;
use crate::service::TaskService;

/// Turn Figma designs into Jetpack Compose code
#[derive(Parser, Debug, Clone)]
#[command(name = "design2code")]
#[command(version)]
pub struct Args {
    /// YAML configuration file; `D2C_*` variables override it
    #[arg(long, short, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the pipeline for one design link and wait for the result
    Run {
        /// Figma link with a `node-id` parameter
        #[arg(long, value_name = "URL")]
        url: String,

        /// Figma personal access token
        #[arg(long, env = "FIGMA_TOKEN", hide_env_values = true)]
        token: String,

        /// Owner the task is accounted to
        #[arg(long, default_value = "cli")]
        owner: String,

        /// Where logs, workspaces and packages go
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Maximum number of stages before giving up
        #[arg(long)]
        step_limit: Option<usize>,
    },

    /// Prune and partition a design JSON file without any network access
    Partition {
        /// Node tree, or a file/nodes response holding it under `document`
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Fragments are kept below total area / DIVISOR
        #[arg(long, value_name = "DIVISOR")]
        divisor: Option<f64>,

        /// Write the fragments here instead of stdout
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

pub async fn run(args: Args) -> Result<()> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Run {
            url,
            token,
            owner,
            output_dir,
            step_limit,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(limit) = step_limit {
                config.step_limit = limit;
            }
            run_pipeline(config, &url, &token, &owner).await
        }
        Command::Partition {
            input,
            divisor,
            output,
        } => {
            let divisor = divisor.unwrap_or(config.partition.split_divisor);
            partition_file(&input, divisor, output.as_deref())
        }
    }
}

async fn run_pipeline(config: PipelineConfig, url: &str, token: &str, owner: &str) -> Result<()> {
    let knowledge = KnowledgeBase::load(config.knowledge_file.as_deref())?;
    let collaborators = Collaborators::from_config(&config)?;
    let service = TaskService::new(
        Arc::new(config),
        TaskRegistry::new(),
        collaborators,
        Arc::new(knowledge),
    );

    let created = service.create(url, token, owner);
    let Some(task_id) = created.task_id else {
        anyhow::bail!("Task was not created: {}", created.message);
    };
    println!("Task {} created", task_id);
    service.wait(task_id).await;

    let report = service.query(&task_id.to_string());
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Accept a bare node, `{"document": ...}`, or a nodes response
fn extract_document(value: Value) -> Result<DesignNode> {
    let value = match value {
        Value::Object(mut map) if map.contains_key("document") => {
            map.remove("document").unwrap_or(Value::Null)
        }
        Value::Object(mut map) if map.contains_key("nodes") => {
            let nodes = map.remove("nodes").unwrap_or(Value::Null);
            nodes
                .as_object()
                .and_then(|nodes| nodes.values().next())
                .and_then(|entry| entry.get("document"))
                .cloned()
                .context("Nodes response holds no document")?
        }
        other => other,
    };
    serde_json::from_value(value).context("Input is not a design node tree")
}

fn partition_file(input: &Path, divisor: f64, output: Option<&Path>) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    let document = prune(&extract_document(value)?);
    let partition = Partitioner::new(divisor).partition(&document);
    tracing::info!("{} fragments: {:?}", partition.len(), partition.ids());

    let json = serde_json::to_string_pretty(&partition)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
