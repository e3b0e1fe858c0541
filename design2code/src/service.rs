//! Task submission surface: create, query, list
//!
//! Each created task runs on its own tokio task with its own log file and
//! workspace; the registry is the only thing runs share.

use design2code_sdk::{log_task_finished, TaskStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::collaborators::{Collaborators, KnowledgeBase};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::logging::TaskLogger;
use crate::messages;
use crate::registry::{TaskRecord, TaskRegistry, TaskUpdate};
use crate::stages::Stages;
use crate::workflow::{WorkflowEngine, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateResponse {
    pub task_id: Option<i64>,
    pub status: TaskStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub task_id: Option<i64>,
    pub status: TaskStatus,
    pub message: String,
    pub stage_message: String,
    pub page_title: Option<String>,
    /// Package path on success, log path on failure
    pub output_locator: Option<String>,
    /// Generated source; only present once the task succeeded
    pub output: Option<String>,
}

impl QueryResponse {
    fn unknown(task_id: Option<i64>, message: &str) -> Self {
        Self {
            task_id,
            status: TaskStatus::Unknown,
            message: message.to_string(),
            stage_message: String::new(),
            page_title: None,
            output_locator: None,
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub tasks: Vec<TaskRecord>,
    pub total: usize,
}

pub struct TaskService {
    registry: TaskRegistry,
    config: Arc<PipelineConfig>,
    engine: Arc<WorkflowEngine>,
    running: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl TaskService {
    pub fn new(
        config: Arc<PipelineConfig>,
        registry: TaskRegistry,
        collaborators: Collaborators,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        let stages = Stages::new(registry.clone(), collaborators, config.clone(), knowledge);
        let engine = WorkflowEngine::new(registry.clone(), Arc::new(stages))
            .with_rules(config.routing_rules())
            .with_step_limit(config.step_limit);
        Self {
            registry,
            config,
            engine: Arc::new(engine),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Tasks started by this service whose handles are still held
    pub fn tracked_tasks(&self) -> usize {
        self.running.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Register a task and start running it in the background
    pub fn create(&self, design_url: &str, credential: &str, owner: &str) -> CreateResponse {
        let limit = self.config.max_running_per_owner;
        let task_id = match self
            .registry
            .create_within_limit(owner, design_url, credential, limit)
        {
            Ok(id) => id,
            Err(PipelineError::RunningLimit { limit }) => {
                tracing::warn!("Owner {} already runs {} tasks, refusing a new one", owner, limit);
                return CreateResponse {
                    task_id: None,
                    status: TaskStatus::CreateFail,
                    message: messages::create_limit_reached(limit),
                };
            }
            Err(e) => {
                tracing::error!("Failed to register task: {}", e);
                return CreateResponse {
                    task_id: None,
                    status: TaskStatus::CreateFail,
                    message: e.to_string(),
                };
            }
        };
        tracing::info!("Created task {} for {}", task_id, owner);

        let state = WorkflowState::new(task_id, design_url, credential);
        let handle = tokio::spawn(run_task(
            self.engine.clone(),
            self.registry.clone(),
            self.config.clone(),
            state,
        ));
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.retain(|_, handle| !handle.is_finished());
        running.insert(task_id, handle);
        drop(running);

        CreateResponse {
            task_id: Some(task_id),
            status: TaskStatus::Creating,
            message: messages::CREATE_OK.to_string(),
        }
    }

    /// Status of a task; `task_id` is the raw id as submitted
    pub fn query(&self, task_id: &str) -> QueryResponse {
        let Ok(id) = task_id.trim().parse::<i64>() else {
            return QueryResponse::unknown(None, messages::INVALID_TASK_ID);
        };
        let Some(record) = self.registry.get(id) else {
            return QueryResponse::unknown(Some(id), messages::QUERY_UNKNOWN_ID);
        };

        let output = if record.status == TaskStatus::Succeeded {
            self.registry.output(id)
        } else {
            None
        };
        QueryResponse {
            task_id: Some(id),
            status: record.status,
            message: messages::status_message(record.status, self.config.max_running_per_owner),
            stage_message: self.registry.stage_message(id),
            page_title: record.page_title,
            output_locator: record.output_locator,
            output,
        }
    }

    pub fn list(&self, owner: &str, offset: usize, limit: usize) -> TaskPage {
        let (tasks, total) = self.registry.list_by_owner(owner, offset, limit);
        TaskPage { tasks, total }
    }

    /// Wait for a task started by [`TaskService::create`] to end
    pub async fn wait(&self, task_id: i64) {
        let handle = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Task {} ended abnormally: {}", task_id, e);
            }
        }
    }

    /// Wait for every task started so far
    pub async fn wait_all(&self) {
        let handles: Vec<_> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (task_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("Task {} ended abnormally: {}", task_id, e);
            }
        }
    }
}

/// Run one task to completion, recording the outcome in the registry
pub async fn run_task(
    engine: Arc<WorkflowEngine>,
    registry: TaskRegistry,
    config: Arc<PipelineConfig>,
    state: WorkflowState,
) {
    let task_id = state.task_id;
    let log_path = config.log_path(task_id);
    let mut logger = match TaskLogger::open(&config.output_dir, task_id) {
        Ok(logger) => logger,
        Err(e) => {
            tracing::error!("Task {} cannot open its log: {:#}", task_id, e);
            registry.complete(task_id, TaskStatus::Failed, log_path.display().to_string());
            log_task_finished!(task_id, TaskStatus::Failed);
            return;
        }
    };
    registry.update(
        task_id,
        TaskUpdate::default().with_locator(logger.path().display().to_string()),
    );

    let status = match engine.run_logged(state, &logger).await {
        Ok(_) => TaskStatus::Succeeded,
        Err(e) => {
            logger.in_scope(|| tracing::error!("Task {} failed: {}", task_id, e));
            registry.complete(task_id, TaskStatus::Failed, logger.path().display().to_string());
            let workspace = config.workspace_dir(task_id);
            if workspace.exists() {
                if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
                    tracing::warn!("Could not remove workspace {}: {}", workspace.display(), e);
                }
            }
            TaskStatus::Failed
        }
    };
    logger.in_scope(|| {
        log_task_finished!(task_id, status);
    });
    logger.close();
}
