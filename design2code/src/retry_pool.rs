//! Bounded-concurrency job pool with automatic per-job retry
//!
//! Jobs are closures producing a future; a failing job is re-run after a
//! fixed delay until it succeeds or its [`RetryPolicy`] is exhausted. Each
//! submission returns a [`JobHandle`] that resolves to the job's value or its
//! last error. A failing job never fails the pool or the submitter.

use anyhow::{anyhow, Result};
use design2code_sdk::log_job_retry;
use futures::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;

use crate::config::PoolConfig;
use crate::error::PipelineError;

/// How often and how patiently a class of jobs is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Pending result of a submitted job
pub struct JobHandle<T> {
    name: String,
    receiver: oneshot::Receiver<Result<T>>,
    retries: Arc<AtomicU32>,
}

impl<T> JobHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retries used so far
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    /// Wait for the job's value or its last error
    pub async fn join(self) -> Result<T> {
        self.join_with_retries().await.0
    }

    /// Wait for the job and report how many retries it took
    pub async fn join_with_retries(self) -> (Result<T>, u32) {
        let result = match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("job {} ended without a result", self.name)),
        };
        (result, self.retries.load(Ordering::SeqCst))
    }
}

pub struct RetryPool {
    semaphore: Arc<Semaphore>,
    policy: RetryPolicy,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RetryPool {
    pub fn new(workers: usize, policy: RetryPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            policy,
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.workers, config.policy())
    }

    /// Pool sized for a known batch: never wider than the batch itself
    pub fn for_batch(config: &PoolConfig, batch_len: usize) -> Self {
        Self::new(config.workers.min(batch_len.max(1)), config.policy())
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Submit a job under the pool's default policy
    pub fn submit<F, Fut, T>(&self, name: impl Into<String>, job: F) -> JobHandle<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with(name, self.policy, job)
    }

    /// Submit a job with its own retry policy
    pub fn submit_with<F, Fut, T>(
        &self,
        name: impl Into<String>,
        policy: RetryPolicy,
        job: F,
    ) -> JobHandle<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = oneshot::channel();
        let retries = Arc::new(AtomicU32::new(0));
        let handle = JobHandle {
            name: name.clone(),
            receiver,
            retries: retries.clone(),
        };

        // Checked and registered under the same lock `shutdown` takes
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            let _ = sender.send(Err(PipelineError::PoolClosed.into()));
            return handle;
        }

        // Jobs log into whichever dispatcher the submitter runs under
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        let semaphore = self.semaphore.clone();
        let max_attempts = policy.max_attempts.max(1);

        let worker = tokio::spawn(
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let _ = sender.send(Err(PipelineError::PoolClosed.into()));
                        return;
                    }
                };

                let mut attempt = 1;
                let result = loop {
                    match job().await {
                        Ok(value) => break Ok(value),
                        Err(e) if attempt < max_attempts => {
                            tracing::warn!(
                                "Job {} failed (attempt {}/{}): {:#}",
                                name,
                                attempt,
                                max_attempts,
                                e
                            );
                            log_job_retry!(&name, attempt, max_attempts, format!("{:#}", e));
                            retries.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(policy.delay).await;
                            attempt += 1;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Job {} gave up after {} attempts: {:#}",
                                name,
                                attempt,
                                e
                            );
                            break Err(e);
                        }
                    }
                };
                let _ = sender.send(result);
            }
            .with_subscriber(dispatch),
        );

        workers.push(worker);
        handle
    }

    /// Stop accepting work and wait for everything already submitted
    pub async fn shutdown(&self) {
        let workers = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *workers)
        };
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("Pool worker ended abnormally: {}", e);
            }
        }
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
