//! Bounded publish job queue
//!
//! `submit` starts a publish job once an in-flight slot is free. Slots are
//! handed out in submission order. A single background loop polls the oldest
//! in-flight job until it reaches a terminal state, frees its slot, and moves
//! on to the next one; it stops when no jobs remain. `drain` waits until every
//! submitted job has an outcome.

use crate::config::PublishQueueConfig;
use crate::error::PublishError;
use crate::hub::{PublishJobState, PublishService};
use cmig_content::ContentRecord;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// A record whose publish job completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRecord {
    /// Record label
    pub label: String,
    /// Remote record id
    pub id: String,
}

/// A record whose publish did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFailure {
    /// Record label
    pub label: String,
    /// Remote record id, if it had one
    pub id: Option<String>,
    /// What went wrong
    pub error: PublishError,
}

/// Outcome of every submitted job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Jobs that reached `COMPLETED`
    pub succeeded: Vec<PublishedRecord>,
    /// Start failures, `FAILED` jobs and exhausted polls
    pub failed: Vec<PublishFailure>,
}

impl PublishReport {
    /// Total jobs accounted for
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether nothing was submitted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug)]
struct PublishJob {
    label: String,
    id: String,
    location: String,
    _slot: OwnedSemaphorePermit,
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<PublishJob>,
    polling: bool,
    submitting: usize,
    peak_in_flight: usize,
    report: PublishReport,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.jobs.is_empty() && !self.polling && self.submitting == 0
    }
}

struct QueueInner {
    service: Arc<dyn PublishService>,
    config: PublishQueueConfig,
    slots: Arc<Semaphore>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Bounded-concurrency publish queue
#[derive(Clone)]
pub struct PublishQueue {
    inner: Arc<QueueInner>,
}

impl PublishQueue {
    /// Queue over `service` with the given limits
    #[must_use]
    pub fn new(service: Arc<dyn PublishService>, config: PublishQueueConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            inner: Arc::new(QueueInner {
                service,
                config,
                slots,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    /// Start publishing `record`, waiting for a free slot first
    ///
    /// # Errors
    /// `PublishError` if the record has no remote id, or the start call fails,
    /// is rejected or carries no job location. The failure is also recorded
    /// in the report returned by [`drain`](Self::drain).
    pub async fn submit(&self, record: &ContentRecord) -> Result<(), PublishError> {
        self.inner.state.lock().submitting += 1;
        let result = self.start(record).await;

        let mut state = self.inner.state.lock();
        state.submitting -= 1;
        match result {
            Ok(job) => {
                tracing::info!("Publishing {} ({})", job.label, job.location);
                state.jobs.push_back(job);
                let in_flight = state.jobs.len() + usize::from(state.polling);
                state.peak_in_flight = state.peak_in_flight.max(in_flight);
                if !state.polling {
                    state.polling = true;
                    tokio::spawn(poll_loop(Arc::clone(&self.inner)));
                }
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Could not publish {}: {}", record.describe(), error);
                state.report.failed.push(PublishFailure {
                    label: record.label.clone(),
                    id: record.id.clone(),
                    error: error.clone(),
                });
                drop(state);
                self.inner.idle.notify_waiters();
                Err(error)
            }
        }
    }

    async fn start(&self, record: &ContentRecord) -> Result<PublishJob, PublishError> {
        let id = record
            .id
            .clone()
            .ok_or_else(|| PublishError::NotCreated {
                label: record.label.clone(),
            })?;

        let slot = Arc::clone(&self.inner.slots)
            .acquire_owned()
            .await
            .map_err(|e| PublishError::Request {
                message: e.to_string(),
            })?;

        let start = self
            .inner
            .service
            .start_publish(record)
            .await
            .map_err(|e| PublishError::Request {
                message: e.to_string(),
            })?;

        if !start.is_success() {
            return Err(PublishError::StartRejected {
                status: start.status,
            });
        }
        let location = start.location.ok_or(PublishError::MissingLocation)?;

        Ok(PublishJob {
            label: record.label.clone(),
            id,
            location,
            _slot: slot,
        })
    }

    /// Wait until every submitted job has an outcome, then take the report
    ///
    /// Returns at once when nothing is outstanding.
    pub async fn drain(&self) -> PublishReport {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.is_idle() {
                    return std::mem::take(&mut state.report);
                }
            }

            notified.await;
        }
    }

    /// Jobs started but not yet finished
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.config.max_in_flight.max(1) - self.inner.slots.available_permits()
    }

    /// Highest number of jobs in flight at once so far
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.inner.state.lock().peak_in_flight
    }
}

impl std::fmt::Debug for PublishQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishQueue")
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

async fn poll_loop(inner: Arc<QueueInner>) {
    loop {
        let next = {
            let mut state = inner.state.lock();
            match state.jobs.pop_front() {
                Some(job) => job,
                None => {
                    state.polling = false;
                    drop(state);
                    inner.idle.notify_waiters();
                    return;
                }
            }
        };

        let outcome = poll_job(&inner, &next).await;
        {
            let mut state = inner.state.lock();
            match outcome {
                Ok(()) => {
                    tracing::info!("Published {} ({})", next.label, next.id);
                    state.report.succeeded.push(PublishedRecord {
                        label: next.label.clone(),
                        id: next.id.clone(),
                    });
                }
                Err(error) => {
                    tracing::warn!("Publish of {} failed: {}", next.label, error);
                    state.report.failed.push(PublishFailure {
                        label: next.label.clone(),
                        id: Some(next.id.clone()),
                        error,
                    });
                }
            }
        }
        // frees the slot for the longest-waiting submitter
        drop(next);
    }
}

async fn poll_job(inner: &QueueInner, job: &PublishJob) -> Result<(), PublishError> {
    let attempts = inner.config.max_poll_attempts;
    for attempt in 1..=attempts {
        tokio::time::sleep(inner.config.poll_interval()).await;

        match inner.service.poll_job(&job.location).await {
            Ok(PublishJobState::Completed) => return Ok(()),
            Ok(PublishJobState::Failed) => {
                return Err(PublishError::JobFailed {
                    location: job.location.clone(),
                });
            }
            Ok(state) => {
                tracing::debug!("Job {} is {:?} (poll {}/{})", job.location, state, attempt, attempts);
            }
            Err(e) => {
                tracing::debug!("Poll {}/{} of {} failed: {}", attempt, attempts, job.location, e);
            }
        }
    }

    Err(PublishError::Exhausted {
        location: job.location.clone(),
        attempts,
    })
}
