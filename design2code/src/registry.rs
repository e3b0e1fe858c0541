//! In-memory task registry
//!
//! Holds every task record, its stage history and output artifact for the
//! lifetime of the process. One mutex guards all tables so that a reader never
//! observes a half-applied change; no I/O happens while it is held.

use chrono::{DateTime, Utc};
use design2code_sdk::TaskStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{PipelineError, PipelineResult};
use crate::messages;

const ID_MASK: i64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Bookkeeping for one submitted task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: i64,
    pub owner: String,
    /// Design link the task was submitted with
    pub input: String,
    #[serde(skip)]
    pub credential: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub page_title: Option<String>,
    /// Log path while running or after failure, package path after success
    pub output_locator: Option<String>,
}

/// Fields to change on a record; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub page_title: Option<String>,
    pub output_locator: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = Some(title.into());
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.output_locator = Some(locator.into());
        self
    }
}

#[derive(Default)]
struct Tables {
    records: HashMap<i64, TaskRecord>,
    stages: HashMap<i64, Vec<String>>,
    outputs: HashMap<i64, String>,
    by_owner: HashMap<String, Vec<i64>>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis() & ID_MASK;
        let mut id = match self.last_id.checked_add(1) {
            Some(next) => now.max(next),
            None => now,
        };
        while self.records.contains_key(&id) {
            id = id.checked_add(1).unwrap_or(1);
        }
        self.last_id = id;
        id
    }

    fn insert(
        &mut self,
        owner: &str,
        input: &str,
        credential: &str,
        id: Option<i64>,
    ) -> PipelineResult<i64> {
        let id = match id {
            Some(id) if id <= 0 => return Err(PipelineError::InvalidTaskId(id)),
            Some(id) if self.records.contains_key(&id) => {
                return Err(PipelineError::DuplicateTask(id));
            }
            Some(id) => {
                self.last_id = self.last_id.max(id);
                id
            }
            None => self.next_id(),
        };

        self.records.insert(
            id,
            TaskRecord {
                id,
                owner: owner.to_string(),
                input: input.to_string(),
                credential: credential.to_string(),
                status: TaskStatus::Creating,
                created_at: Utc::now(),
                ended_at: None,
                page_title: None,
                output_locator: None,
            },
        );
        self.stages.insert(id, Vec::new());
        self.by_owner.entry(owner.to_string()).or_default().push(id);
        Ok(id)
    }

    fn count_running(&self, owner: &str) -> usize {
        self.by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.records.get(id))
                    .filter(|record| record.status.is_active())
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Shared handle to the task tables; clones see the same data
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tables: Arc<Mutex<Tables>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new task in `Creating` state and return its id
    pub fn create(
        &self,
        owner: &str,
        input: &str,
        credential: &str,
        id: Option<i64>,
    ) -> PipelineResult<i64> {
        let mut tables = self.lock();
        tables.insert(owner, input, credential, id)
    }

    /// Register a task unless `owner` already has `limit` active ones
    ///
    /// The check and the insert happen under one lock.
    pub fn create_within_limit(
        &self,
        owner: &str,
        input: &str,
        credential: &str,
        limit: usize,
    ) -> PipelineResult<i64> {
        let mut tables = self.lock();
        let running = tables.count_running(owner);
        if running >= limit {
            return Err(PipelineError::RunningLimit { limit });
        }
        tables.insert(owner, input, credential, None)
    }

    /// Apply the supplied fields; unknown ids are ignored
    pub fn update(&self, id: i64, update: TaskUpdate) {
        let mut tables = self.lock();
        if let Some(record) = tables.records.get_mut(&id) {
            if let Some(status) = update.status {
                record.status = status;
            }
            if let Some(title) = update.page_title {
                record.page_title = Some(title);
            }
            if let Some(locator) = update.output_locator {
                record.output_locator = Some(locator);
            }
            if let Some(ended_at) = update.ended_at {
                record.ended_at = Some(ended_at);
            }
        }
    }

    /// Mark a task finished with its final status and output locator
    pub fn complete(&self, id: i64, status: TaskStatus, locator: impl Into<String>) {
        self.update(
            id,
            TaskUpdate {
                status: Some(status),
                output_locator: Some(locator.into()),
                ended_at: Some(Utc::now()),
                ..Default::default()
            },
        );
    }

    pub fn append_stage(&self, id: i64, stage: &str) {
        let mut tables = self.lock();
        if tables.records.contains_key(&id) {
            tables.stages.entry(id).or_default().push(stage.to_string());
        }
    }

    pub fn get(&self, id: i64) -> Option<TaskRecord> {
        self.lock().records.get(&id).cloned()
    }

    pub fn stage_history(&self, id: i64) -> Vec<String> {
        self.lock().stages.get(&id).cloned().unwrap_or_default()
    }

    /// Number of times `stage` has been entered by a task
    pub fn stage_attempts(&self, id: i64, stage: &str) -> usize {
        self.lock()
            .stages
            .get(&id)
            .map(|history| history.iter().filter(|s| s.as_str() == stage).count())
            .unwrap_or(0)
    }

    /// Human-readable description of the task's current stage
    pub fn stage_message(&self, id: i64) -> String {
        let history = self.stage_history(id);
        messages::stage_message(&history)
    }

    pub fn set_output(&self, id: i64, artifact: impl Into<String>) {
        let mut tables = self.lock();
        if tables.records.contains_key(&id) {
            tables.outputs.insert(id, artifact.into());
        }
    }

    pub fn output(&self, id: i64) -> Option<String> {
        self.lock().outputs.get(&id).cloned()
    }

    /// A page of an owner's tasks, newest first, plus the owner's total
    pub fn list_by_owner(&self, owner: &str, offset: usize, limit: usize) -> (Vec<TaskRecord>, usize) {
        let tables = self.lock();
        let mut records: Vec<&TaskRecord> = tables
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| tables.records.get(id)).collect())
            .unwrap_or_default();
        let total = records.len();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let page = records
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, total)
    }

    /// Tasks of an owner still counting against the running limit
    pub fn count_running(&self, owner: &str) -> usize {
        self.lock().count_running(owner)
    }
}
