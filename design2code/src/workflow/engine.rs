//! Runs the stage graph for one task

use async_trait::async_trait;
use design2code_sdk::{log_stage_complete, log_stage_failed, log_stage_start};
use std::sync::Arc;
use tracing::instrument::WithSubscriber;

use super::stage::{next_stage, RoutingRules, Stage};
use super::state::{StageUpdate, WorkflowState};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::TaskLogger;
use crate::registry::TaskRegistry;

pub const DEFAULT_STEP_LIMIT: usize = 60;

/// Executes the body of a stage; all side effects of a run happen here
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, stage: Stage, state: &WorkflowState) -> anyhow::Result<StageUpdate>;
}

pub struct WorkflowEngine {
    registry: TaskRegistry,
    executor: Arc<dyn StageExecutor>,
    rules: RoutingRules,
    step_limit: usize,
}

impl WorkflowEngine {
    pub fn new(registry: TaskRegistry, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            registry,
            executor,
            rules: RoutingRules::default(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_rules(mut self, rules: RoutingRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn rules(&self) -> &RoutingRules {
        &self.rules
    }

    /// Run under a task's own log dispatcher
    pub async fn run_logged(
        &self,
        state: WorkflowState,
        logger: &TaskLogger,
    ) -> PipelineResult<WorkflowState> {
        self.run(state)
            .with_subscriber(logger.dispatch().clone())
            .await
    }

    /// Drive `state` from the first stage until the graph ends
    ///
    /// At most `step_limit` stages are executed; wanting one more is fatal.
    pub async fn run(&self, mut state: WorkflowState) -> PipelineResult<WorkflowState> {
        let task_id = state.task_id;
        let mut steps = 0;
        let mut current = Some(Stage::START);

        while let Some(stage) = current {
            if steps >= self.step_limit {
                tracing::error!(
                    "Task {} hit the step limit of {} before {}",
                    task_id,
                    self.step_limit,
                    stage
                );
                let err = PipelineError::StepLimitExceeded {
                    limit: self.step_limit,
                };
                log_stage_failed!(task_id, stage.name(), err);
                return Err(err);
            }
            steps += 1;

            self.registry.append_stage(task_id, stage.name());
            let attempt = self.registry.stage_attempts(task_id, stage.name());
            tracing::info!("--- {} (step {}, visit {}) ---", stage, steps, attempt);
            log_stage_start!(task_id, stage.name(), attempt);

            let update = match self.executor.execute(stage, &state).await {
                Ok(update) => update,
                Err(source) => {
                    tracing::error!("Stage {} failed: {:#}", stage, source);
                    log_stage_failed!(task_id, stage.name(), format!("{:#}", source));
                    return Err(PipelineError::Stage { stage, source });
                }
            };
            if let Err(err) = state.apply(stage, update) {
                log_stage_failed!(task_id, stage.name(), err);
                return Err(err);
            }
            state.last_stage = Some(stage);
            log_stage_complete!(task_id, stage.name());

            current = next_stage(stage, &state, &self.rules);
        }

        Ok(state)
    }
}
