//! Pipeline configuration
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional YAML file and `D2C_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry_pool::RetryPolicy;
use crate::workflow::RoutingRules;

/// Retry pool sizing and default retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl PoolConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Fragments must be smaller than `root area / split_divisor`
    pub split_divisor: f64,
    /// Pause between two classification submissions
    pub pacing_ms: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            split_divisor: 10.0,
            pacing_ms: 5000,
        }
    }
}

impl PartitionConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Code generation settings and the validity rule for generated source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoderConfig {
    pub max_attempts: usize,
    pub min_source_len: usize,
    pub required_marker: String,
    pub package_declaration: String,
    /// Generated source, relative to the workspace
    pub source_file: PathBuf,
    /// Test harness the preview renders, relative to the workspace
    pub test_file: PathBuf,
    /// Where exported bitmaps go, relative to the workspace
    pub asset_dir: PathBuf,
    /// Where the reference screenshot goes, relative to the workspace
    pub screenshot_dir: PathBuf,
}

impl Default for CoderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            min_source_len: 700,
            required_marker: "@Preview".to_string(),
            package_declaration: "package com.example.myapplication".to_string(),
            source_file: PathBuf::from("app/src/main/java/com/example/myapplication/Greeting.kt"),
            test_file: PathBuf::from("app/src/test/java/com/example/myapplication/ResourcesTest.kt"),
            asset_dir: PathBuf::from("app/src/main/res/drawable-xxhdpi"),
            screenshot_dir: PathBuf::from("app/src/test/snapshots/images"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigmaConfig {
    pub api_base: String,
    /// Request cache directory; disabled when unset
    pub cache_dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for FigmaConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.figma.com".to_string(),
            cache_dir: None,
            timeout_secs: 30,
        }
    }
}

/// External program used as the generative model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: "d2c-model".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Git repository holding the project template
    pub template_repo: String,
    pub compile_task: String,
    pub preview_task: String,
    /// Screenshot recorded by the preview task, relative to the workspace
    pub preview_screenshot: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            template_repo: String::new(),
            compile_task: "updateDebugScreenshotTest".to_string(),
            preview_task: ":app:recordPaparazziDebug".to_string(),
            preview_screenshot: PathBuf::from(
                "app/src/test/snapshots/images/com.example.myapplication_ResourcesTest_compose[Default].png",
            ),
        }
    }
}

/// Top-level configuration for the pipeline and its collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Holds task logs, workspaces and packaged output
    pub output_dir: PathBuf,
    pub step_limit: usize,
    pub max_running_per_owner: usize,
    pub evaluation_threshold: f64,
    /// JSON file mapping component names to knowledge entries
    pub knowledge_file: Option<PathBuf>,
    pub pool: PoolConfig,
    pub partition: PartitionConfig,
    pub coder: CoderConfig,
    pub figma: FigmaConfig,
    pub generator: GeneratorConfig,
    pub toolchain: ToolchainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir().join("d2c_task_output"),
            step_limit: 60,
            max_running_per_owner: 5,
            evaluation_threshold: 0.0,
            knowledge_file: None,
            pool: PoolConfig::default(),
            partition: PartitionConfig::default(),
            coder: CoderConfig::default(),
            figma: FigmaConfig::default(),
            generator: GeneratorConfig::default(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then the YAML file (if any), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay `D2C_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("D2C_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("D2C_STEP_LIMIT") {
            self.step_limit = parse_var("D2C_STEP_LIMIT", &value)?;
        }
        if let Some(value) = lookup("D2C_MAX_RUNNING") {
            self.max_running_per_owner = parse_var("D2C_MAX_RUNNING", &value)?;
        }
        if let Some(value) = lookup("D2C_WORKERS") {
            self.pool.workers = parse_var("D2C_WORKERS", &value)?;
        }
        if let Some(value) = lookup("D2C_PACING_MS") {
            self.partition.pacing_ms = parse_var("D2C_PACING_MS", &value)?;
        }
        if let Some(value) = lookup("D2C_EVALUATION_THRESHOLD") {
            self.evaluation_threshold = parse_var("D2C_EVALUATION_THRESHOLD", &value)?;
        }
        if let Some(file) = lookup("D2C_KNOWLEDGE_FILE") {
            self.knowledge_file = Some(PathBuf::from(file));
        }
        if let Some(base) = lookup("D2C_FIGMA_API") {
            self.figma.api_base = base;
        }
        if let Some(dir) = lookup("D2C_FIGMA_CACHE_DIR") {
            self.figma.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(program) = lookup("D2C_GENERATOR") {
            self.generator.program = program;
        }
        if let Some(repo) = lookup("D2C_TEMPLATE_REPO") {
            self.toolchain.template_repo = repo;
        }
        Ok(())
    }

    /// Conditional-edge thresholds derived from the coder settings
    pub fn routing_rules(&self) -> RoutingRules {
        RoutingRules {
            min_source_len: self.coder.min_source_len,
            required_marker: self.coder.required_marker.clone(),
            threshold: self.evaluation_threshold,
        }
    }

    /// Log file of a task
    pub fn log_path(&self, task_id: i64) -> PathBuf {
        self.output_dir.join(format!("{}.log", task_id))
    }

    /// Workspace directory of a task
    pub fn workspace_dir(&self, task_id: i64) -> PathBuf {
        self.output_dir.join(task_id.to_string())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}
