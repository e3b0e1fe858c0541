//! Tracing setup and per-task log files
//!
//! The process has one console subscriber. Every task additionally owns a
//! [`TaskLogger`]: a dispatcher that writes to `<output_dir>/<task_id>.log`
//! and echoes to stderr. Work done for a task runs under that dispatcher via
//! [`tracing::instrument::WithSubscriber`], so nothing relies on thread-local
//! or global task context.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the process-wide console subscriber (respects `RUST_LOG`)
pub fn init_tracing() {
    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter())
        .try_init();
}

/// Log handle owned by one task
pub struct TaskLogger {
    task_id: i64,
    path: PathBuf,
    dispatch: Dispatch,
    guard: Option<WorkerGuard>,
}

impl TaskLogger {
    /// Open (or append to) `<dir>/<task_id>.log`
    pub fn open(dir: &Path, task_id: i64) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let file_name = format!("{}.log", task_id);
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(&file_name)
            .build(dir)
            .with_context(|| format!("Failed to open task log in {}", dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(EnvFilter::new("info")),
            )
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(env_filter()),
            );

        Ok(Self {
            task_id,
            path: dir.join(file_name),
            dispatch: Dispatch::new(subscriber),
            guard: Some(guard),
        })
    }

    pub fn task_id(&self) -> i64 {
        self.task_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dispatcher to run this task's work under
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run a closure with this task's dispatcher as the default
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Flush buffered lines and release the file
    pub fn close(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
        }
    }
}

impl Drop for TaskLogger {
    fn drop(&mut self) {
        self.close();
    }
}
