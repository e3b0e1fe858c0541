//! Error types for the pipeline core

use design2code_sdk::CollaboratorError;
use thiserror::Error;

use crate::workflow::Stage;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run visited more stages than its budget allows
    #[error("step limit of {limit} stages exceeded")]
    StepLimitExceeded { limit: usize },

    #[error("stage {stage} failed: {source:#}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// A stage returned an update that would leave the state inconsistent
    #[error("invalid update from stage {stage}: {reason}")]
    InvalidUpdate { stage: Stage, reason: String },

    #[error("task {0} already exists")]
    DuplicateTask(i64),

    #[error("task id {0} is not a positive integer")]
    InvalidTaskId(i64),

    /// The owner already has the maximum number of active tasks
    #[error("running task limit of {limit} reached")]
    RunningLimit { limit: usize },

    #[error("retry pool is shut down")]
    PoolClosed,

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl PipelineError {
    /// Only an explicit rate-limit signal is worth retrying
    pub fn is_retriable(&self) -> bool {
        match self {
            PipelineError::Collaborator(err) => err.is_rate_limited(),
            PipelineError::Stage { source, .. } => source
                .downcast_ref::<CollaboratorError>()
                .map(CollaboratorError::is_rate_limited)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } | PipelineError::InvalidUpdate { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}
