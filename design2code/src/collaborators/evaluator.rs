//! Screenshot comparison delegated to the generative model

use async_trait::async_trait;
use design2code_sdk::{CollaboratorError, Evaluator, GenerationContext, Generator};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::reply;

const SYSTEM_PROMPT: &str = "You compare a design mockup with a screenshot of the \
implemented UI. Score each criterion (layout, spacing, color, typography, imagery) \
from 0 to 1. Reply with a single JSON object mapping criterion to score.";

pub struct ModelEvaluator {
    generator: Arc<dyn Generator>,
}

impl ModelEvaluator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Evaluator for ModelEvaluator {
    async fn evaluate(
        &self,
        reference: &Path,
        actual: &Path,
    ) -> Result<BTreeMap<String, f64>, CollaboratorError> {
        let prompt = format!(
            "Design mockup: {}\nRuntime screenshot: {}\nScore how closely the screenshot matches the mockup.",
            reference.display(),
            actual.display()
        );
        let context = GenerationContext::new("evaluate")
            .with_system_prompt(SYSTEM_PROMPT)
            .with_attachment(reference)
            .with_attachment(actual);

        let text = self.generator.generate(&prompt, &context).await?;
        let scores: BTreeMap<String, f64> = reply::parse_json(&text)
            .map_err(|e| CollaboratorError::InvalidResponse(format!("{:#}", e)))?;
        tracing::info!("Evaluation scores: {:?}", scores);
        Ok(scores)
    }
}
