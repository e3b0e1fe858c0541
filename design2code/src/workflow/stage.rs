//! Stage identities and the routing between them

use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExportDocument,
    InitWorkspace,
    ExportAssets,
    CaptureScreenshot,
    RecognizeComponents,
    LookupKnowledge,
    Coder,
    ReplaceTester,
    Compile,
    Bugfix,
    Preview,
    Cleanup,
    Evaluate,
    Finalize,
}

impl Stage {
    pub const ALL: [Stage; 14] = [
        Stage::ExportDocument,
        Stage::InitWorkspace,
        Stage::ExportAssets,
        Stage::CaptureScreenshot,
        Stage::RecognizeComponents,
        Stage::LookupKnowledge,
        Stage::Coder,
        Stage::ReplaceTester,
        Stage::Compile,
        Stage::Bugfix,
        Stage::Preview,
        Stage::Cleanup,
        Stage::Evaluate,
        Stage::Finalize,
    ];

    pub const START: Stage = Stage::ExportDocument;

    pub fn name(self) -> &'static str {
        match self {
            Stage::ExportDocument => "export_document",
            Stage::InitWorkspace => "init_workspace",
            Stage::ExportAssets => "export_assets",
            Stage::CaptureScreenshot => "capture_screenshot",
            Stage::RecognizeComponents => "recognize_components",
            Stage::LookupKnowledge => "lookup_knowledge",
            Stage::Coder => "coder",
            Stage::ReplaceTester => "replace_tester",
            Stage::Compile => "compile",
            Stage::Bugfix => "bugfix",
            Stage::Preview => "preview",
            Stage::Cleanup => "cleanup",
            Stage::Evaluate => "evaluate",
            Stage::Finalize => "finalize",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.name() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Thresholds the conditional edges are decided on
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRules {
    pub min_source_len: usize,
    pub required_marker: String,
    /// Every evaluation score must reach this to finish
    pub threshold: f64,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            min_source_len: 700,
            required_marker: "@Preview".to_string(),
            threshold: 0.0,
        }
    }
}

impl RoutingRules {
    /// Long enough and carrying the preview marker
    pub fn is_valid_source(&self, source: &str) -> bool {
        let source = source.trim();
        source.len() > self.min_source_len && source.contains(&self.required_marker)
    }

    pub fn scores_pass(&self, state: &WorkflowState) -> bool {
        match &state.scores {
            Some(scores) if !scores.is_empty() => {
                scores.values().all(|score| *score >= self.threshold)
            }
            _ => false,
        }
    }
}

/// Stage to run after `stage`, decided from the state as it is now
///
/// `None` ends the run.
pub fn next_stage(stage: Stage, state: &WorkflowState, rules: &RoutingRules) -> Option<Stage> {
    let next = match stage {
        Stage::ExportDocument => Stage::InitWorkspace,
        Stage::InitWorkspace => Stage::ExportAssets,
        Stage::ExportAssets => Stage::CaptureScreenshot,
        Stage::CaptureScreenshot => Stage::RecognizeComponents,
        Stage::RecognizeComponents => Stage::LookupKnowledge,
        Stage::LookupKnowledge => Stage::Coder,
        Stage::Coder => Stage::ReplaceTester,
        Stage::ReplaceTester => Stage::Compile,
        Stage::Compile => match &state.compile {
            Some(outcome) if outcome.is_success() => {
                let source = state.source.as_deref().unwrap_or_default();
                if rules.is_valid_source(source) {
                    Stage::Preview
                } else {
                    Stage::Coder
                }
            }
            _ => Stage::Bugfix,
        },
        Stage::Bugfix => Stage::Compile,
        Stage::Preview => match &state.preview {
            Some(outcome) if outcome.is_success() => Stage::Cleanup,
            _ => Stage::Bugfix,
        },
        Stage::Cleanup => Stage::Evaluate,
        Stage::Evaluate => {
            if rules.scores_pass(state) {
                Stage::Finalize
            } else {
                Stage::Coder
            }
        }
        Stage::Finalize => return None,
    };
    Some(next)
}
