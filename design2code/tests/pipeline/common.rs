//! Scripted collaborators and fixtures shared by the pipeline tests

use design2code::collaborators::{Collaborators, KnowledgeBase, Packager};
use design2code::config::PipelineConfig;
use design2code::registry::TaskRegistry;
use design2code::service::TaskService;
use design2code::stages::Stages;
use design2code::workflow::WorkflowEngine;
use design2code_sdk::{
    async_trait, BuildOutcome, CollaboratorError, DesignNode, DesignRef, DesignSource, Evaluator,
    FetchedDocument, GenerationContext, Generator, Paint, PreviewOutcome, Toolchain,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DESIGN_URL: &str = "https://www.figma.com/design/KEY/Home-Page?node-id=0-1";

/// 1000x2000 page: a small icon, an image-filled photo and a full-width body
pub fn sample_page() -> DesignNode {
    DesignNode::new("0:1", "FRAME")
        .with_name("Home")
        .with_bounds(0.0, 0.0, 1000.0, 2000.0)
        .with_children(vec![
            DesignNode::new("1:1", "INSTANCE")
                .with_name("star")
                .with_bounds(0.0, 0.0, 100.0, 100.0),
            DesignNode::new("1:2", "RECTANGLE")
                .with_name("photo")
                .with_bounds(0.0, 200.0, 300.0, 200.0)
                .with_fill(Paint::image("abc")),
            DesignNode::new("1:3", "FRAME")
                .with_name("body")
                .with_bounds(0.0, 400.0, 1000.0, 1200.0),
            DesignNode::new("1:4", "TEXT")
                .with_name("ghost")
                .with_bounds(0.0, 1700.0, 100.0, 20.0)
                .hidden(),
        ])
}

/// Kotlin source long enough to pass validation, drawing the star icon
pub fn valid_source() -> String {
    format!(
        "package com.example.myapplication\n\n\
         import androidx.compose.runtime.Composable\n\n\
         @Composable\nfun HomePage() {{\n    Image(painterResource(R.drawable.ic_star), null)\n}}\n\n\
         @Preview\n@Composable\nfun HomePagePreview() {{\n    HomePage()\n}}\n// {}\n",
        "padding ".repeat(100)
    )
}

pub struct FakeDesign {
    pub root: DesignNode,
    /// Node ids whose download fails
    pub failing: HashSet<String>,
    pub link_calls: AtomicUsize,
}

impl FakeDesign {
    pub fn new(root: DesignNode) -> Self {
        Self {
            root,
            failing: HashSet::new(),
            link_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DesignSource for FakeDesign {
    async fn fetch_document(
        &self,
        _reference: &DesignRef,
        _credential: &str,
    ) -> Result<FetchedDocument, CollaboratorError> {
        Ok(FetchedDocument {
            title: Some(self.root.name.clone()),
            root: self.root.clone(),
        })
    }

    async fn fetch_asset_links(
        &self,
        _file_key: &str,
        ids: &[String],
        _credential: &str,
    ) -> Result<HashMap<String, String>, CollaboratorError> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ids
            .iter()
            .map(|id| (id.clone(), format!("mem://{}", id)))
            .collect())
    }

    async fn download_asset(&self, url: &str) -> Result<Vec<u8>, CollaboratorError> {
        let id = url.trim_start_matches("mem://");
        if self.failing.contains(id) {
            return Err(CollaboratorError::Transport(format!("connection reset for {}", id)));
        }
        Ok(format!("png:{}", id).into_bytes())
    }
}

/// Replies by purpose; records every purpose it was called for
pub struct FakeGenerator {
    pub coder_reply: String,
    /// Coder calls answer with a 429 instead of `coder_reply`
    pub coder_rate_limited: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::with_coder_reply(format!("Here is the code:\n```kotlin\n{}```", valid_source()))
    }

    pub fn with_coder_reply(reply: impl Into<String>) -> Self {
        Self {
            coder_reply: reply.into(),
            coder_rate_limited: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rate_limited_coder() -> Self {
        Self {
            coder_rate_limited: true,
            ..Self::new()
        }
    }

    pub fn count(&self, purpose: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == purpose).count()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        context: &GenerationContext,
    ) -> Result<String, CollaboratorError> {
        self.calls.lock().unwrap().push(context.purpose.clone());
        let reply = match context.purpose.as_str() {
            "classify" => json!({"icons": [{"figma_node_id": "1:1", "icon_file_name": "ic_star"}]})
                .to_string(),
            "recognize_components" => r#"{"components": ["DuxButton", "Mystery"]}"#.to_string(),
            "coder" if self.coder_rate_limited => {
                return Err(CollaboratorError::RateLimited {
                    retry_after: Duration::from_secs(60),
                })
            }
            "coder" => self.coder_reply.clone(),
            "replace_tester" => "```kotlin\nclass ResourcesTest {}\n```".to_string(),
            "bugfix" => valid_source(),
            other => return Err(CollaboratorError::InvalidResponse(format!("unexpected {}", other))),
        };
        Ok(reply)
    }
}

/// Compile fails `compile_failures` times, then everything passes
pub struct FakeToolchain {
    pub compile_failures: Mutex<usize>,
}

impl FakeToolchain {
    pub fn failing_compiles(count: usize) -> Self {
        Self {
            compile_failures: Mutex::new(count),
        }
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn prepare(&self, workspace: &Path) -> Result<(), CollaboratorError> {
        let test_dir = workspace.join("app/src/test/java/com/example/myapplication");
        tokio::fs::create_dir_all(&test_dir).await?;
        tokio::fs::write(test_dir.join("ResourcesTest.kt"), "class ResourcesTest").await?;
        Ok(())
    }

    async fn compile(&self, _workspace: &Path) -> Result<BuildOutcome, CollaboratorError> {
        let mut failures = self.compile_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Ok(BuildOutcome::Failed {
                error: "e: Unresolved reference: DuxButton".to_string(),
            });
        }
        Ok(BuildOutcome::Passed)
    }

    async fn preview(&self, workspace: &Path) -> Result<PreviewOutcome, CollaboratorError> {
        let screenshot = workspace.join("app/build/preview.png");
        tokio::fs::create_dir_all(workspace.join("app/build")).await?;
        tokio::fs::write(&screenshot, b"runtime").await?;
        Ok(PreviewOutcome::Passed { screenshot })
    }
}

pub struct FakeEvaluator;

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn evaluate(
        &self,
        reference: &Path,
        actual: &Path,
    ) -> Result<BTreeMap<String, f64>, CollaboratorError> {
        assert!(reference.is_file(), "missing {}", reference.display());
        assert!(actual.is_file(), "missing {}", actual.display());
        Ok(BTreeMap::from([
            ("layout".to_string(), 0.9),
            ("color".to_string(), 0.8),
        ]))
    }
}

/// Writes the workspace's relative file list instead of a real archive
pub struct ListingPackager;

fn walk(dir: &Path, base: &Path, out: &mut Vec<String>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            walk(&path, base, out);
        } else {
            out.push(path.strip_prefix(base).unwrap().display().to_string());
        }
    }
}

#[async_trait]
impl Packager for ListingPackager {
    async fn package(&self, source_dir: &Path, archive: &Path) -> Result<(), CollaboratorError> {
        let mut files = Vec::new();
        walk(source_dir, source_dir, &mut files);
        files.sort();
        tokio::fs::write(archive, files.join("\n")).await?;
        Ok(())
    }
}

pub fn read_listing(archive: &Path) -> Vec<String> {
    std::fs::read_to_string(archive)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Fast settings rooted in `output_dir`
pub fn test_config(output_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.output_dir = output_dir.to_path_buf();
    config.pool.workers = 2;
    config.pool.max_attempts = 2;
    config.pool.retry_delay_ms = 0;
    config.partition.pacing_ms = 0;
    config.coder.max_attempts = 3;
    config
}

pub struct Harness {
    pub service: TaskService,
    pub design: Arc<FakeDesign>,
    pub generator: Arc<FakeGenerator>,
    pub output_dir: PathBuf,
    _dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    pub design: FakeDesign,
    pub generator: FakeGenerator,
    pub toolchain: FakeToolchain,
    pub knowledge: KnowledgeBase,
    pub configure: Box<dyn FnOnce(&mut PipelineConfig)>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            design: FakeDesign::new(sample_page()),
            generator: FakeGenerator::new(),
            toolchain: FakeToolchain::failing_compiles(0),
            knowledge: KnowledgeBase::from_iter([(
                "DuxButton".to_string(),
                json!({"code": "DuxButton(text = \"OK\")"}),
            )]),
            configure: Box::new(|_| {}),
        }
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("out");
        let mut config = test_config(&output_dir);
        (self.configure)(&mut config);

        let design = Arc::new(self.design);
        let generator = Arc::new(self.generator);
        let collaborators = Collaborators {
            design: design.clone(),
            generator: generator.clone(),
            toolchain: Arc::new(self.toolchain),
            evaluator: Arc::new(FakeEvaluator),
            packager: Arc::new(ListingPackager),
        };
        let service = TaskService::new(
            Arc::new(config),
            TaskRegistry::new(),
            collaborators,
            Arc::new(self.knowledge),
        );
        Harness {
            service,
            design,
            generator,
            output_dir,
            _dir: dir,
        }
    }

    /// Engine wired to the same fakes, for runs whose error matters
    pub fn build_engine(self) -> EngineHarness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir.path().join("out"));
        (self.configure)(&mut config);
        let config = Arc::new(config);

        let generator = Arc::new(self.generator);
        let collaborators = Collaborators {
            design: Arc::new(self.design),
            generator: generator.clone(),
            toolchain: Arc::new(self.toolchain),
            evaluator: Arc::new(FakeEvaluator),
            packager: Arc::new(ListingPackager),
        };
        let registry = TaskRegistry::new();
        let stages = Stages::new(
            registry.clone(),
            collaborators,
            config.clone(),
            Arc::new(self.knowledge),
        );
        let engine = WorkflowEngine::new(registry.clone(), Arc::new(stages))
            .with_rules(config.routing_rules())
            .with_step_limit(config.step_limit);
        EngineHarness {
            engine,
            registry,
            generator,
            _dir: dir,
        }
    }
}

pub struct EngineHarness {
    pub engine: WorkflowEngine,
    pub registry: TaskRegistry,
    pub generator: Arc<FakeGenerator>,
    _dir: tempfile::TempDir,
}
