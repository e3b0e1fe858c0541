//! Concrete collaborators and the bundle handed to the stages
//!
//! Each external system sits behind a trait from `design2code-sdk`, so the
//! stages can be exercised against fakes.

pub mod evaluator;
pub mod figma;
pub mod generator;
pub mod knowledge;
pub mod packager;
pub mod toolchain;

use anyhow::Result;
use design2code_sdk::{DesignSource, Evaluator, Generator, Toolchain};
use std::sync::Arc;

pub use evaluator::ModelEvaluator;
pub use figma::FigmaClient;
pub use generator::CommandGenerator;
pub use knowledge::KnowledgeBase;
pub use packager::{Packager, ZipPackager};
pub use toolchain::GradleToolchain;

use crate::config::PipelineConfig;

#[derive(Clone)]
pub struct Collaborators {
    pub design: Arc<dyn DesignSource>,
    pub generator: Arc<dyn Generator>,
    pub toolchain: Arc<dyn Toolchain>,
    pub evaluator: Arc<dyn Evaluator>,
    pub packager: Arc<dyn Packager>,
}

impl Collaborators {
    /// Production wiring from configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let generator: Arc<dyn Generator> = Arc::new(CommandGenerator::from_config(&config.generator));
        Ok(Self {
            design: Arc::new(FigmaClient::new(&config.figma)?),
            evaluator: Arc::new(ModelEvaluator::new(generator.clone())),
            generator,
            toolchain: Arc::new(GradleToolchain::from_config(&config.toolchain)),
            packager: Arc::new(ZipPackager),
        })
    }
}
