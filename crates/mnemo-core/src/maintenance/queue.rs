//! Per-thread maintenance queue.
//!
//! Every thread with pending work gets a bounded `mpsc` mailbox and one
//! worker task that drains it in order, so two jobs of the same thread
//! never run concurrently while different threads proceed in parallel.
//! Workers exit after an idle timeout and are respawned on demand.
//!
//! Jobs are persisted before dispatch and deleted after the pipeline
//! finishes. A job that fails with a storage error is retried with
//! exponential backoff until `max_attempts`; after that it stays persisted
//! with its last error for inspection. A job that finds its mailbox full
//! also stays persisted, and the worker reloads it from the job store once
//! the mailbox drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mnemo_types::config::MaintenanceConfig;
use mnemo_types::error::MemoryError;
use mnemo_types::maintenance::{MaintenanceJob, MaintenanceReport};
use mnemo_types::thread::ThreadId;

use super::{JobRunner, backoff_delay};
use crate::repository::job::MaintenanceJobRepository;

type ReplySender = oneshot::Sender<Result<MaintenanceReport, MemoryError>>;

/// A job in a worker mailbox, optionally with a caller waiting on the result.
struct QueuedJob {
    job: MaintenanceJob,
    reply: Option<ReplySender>,
}

struct QueueInner<J: MaintenanceJobRepository> {
    jobs: J,
    runner: Arc<dyn JobRunner>,
    config: MaintenanceConfig,
    /// Per-thread worker mailboxes (thread_id -> mpsc sender).
    mailboxes: DashMap<ThreadId, mpsc::Sender<QueuedJob>>,
    /// Jobs dispatched but not yet finished (including retry waits).
    in_flight: AtomicUsize,
    /// Jobs per thread that found the mailbox full. They stay persisted and
    /// count as in flight until the worker drains and re-dispatches them.
    overflowed: DashMap<ThreadId, usize>,
    idle: Notify,
    cancel: CancellationToken,
}

/// Handle to the maintenance queue. Cheap to clone.
pub struct MaintenanceQueue<J: MaintenanceJobRepository + 'static> {
    inner: Arc<QueueInner<J>>,
}

impl<J: MaintenanceJobRepository + 'static> Clone for MaintenanceQueue<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<J: MaintenanceJobRepository + 'static> MaintenanceQueue<J> {
    pub fn new(jobs: J, runner: Arc<dyn JobRunner>, config: MaintenanceConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                jobs,
                runner,
                config,
                mailboxes: DashMap::new(),
                in_flight: AtomicUsize::new(0),
                overflowed: DashMap::new(),
                idle: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Persist `job` and hand it to its thread's worker (fire-and-forget).
    ///
    /// Returns once the job is durable; the work itself happens later.
    pub async fn enqueue(&self, job: MaintenanceJob) -> Result<Uuid, MemoryError> {
        self.inner.jobs.save(&job).await?;
        let id = job.id;
        debug!(job_id = %id, thread_id = %job.thread_id, turn_id = job.turn_id, "maintenance job enqueued");
        self.inner.dispatch(QueuedJob { job, reply: None });
        Ok(id)
    }

    /// Persist `job`, run it on its thread's worker and wait for the result.
    ///
    /// Goes through the same mailbox as background jobs, so it never
    /// overlaps with other maintenance of the thread.
    pub async fn run_and_wait(&self, job: MaintenanceJob) -> Result<MaintenanceReport, MemoryError> {
        self.inner.jobs.save(&job).await?;
        let (tx, rx) = oneshot::channel();
        self.inner.dispatch(QueuedJob {
            job,
            reply: Some(tx),
        });
        rx.await.map_err(|_| {
            MemoryError::Maintenance("job was dropped before completion".to_string())
        })?
    }

    /// Re-dispatch persisted jobs left over from a previous run.
    ///
    /// Returns the number of jobs dispatched. Jobs that already used up
    /// their attempts are left alone.
    pub async fn recover(&self) -> Result<usize, MemoryError> {
        let pending = self
            .inner
            .jobs
            .list_pending(self.inner.config.max_attempts)
            .await?;
        let count = pending.len();
        for job in pending {
            self.inner.dispatch(QueuedJob { job, reply: None });
        }
        if count > 0 {
            info!(count, "recovered pending maintenance jobs");
        }
        Ok(count)
    }

    /// Every persisted job, including abandoned ones.
    pub async fn persisted(&self) -> Result<Vec<MaintenanceJob>, MemoryError> {
        Ok(self.inner.jobs.list().await?)
    }

    /// Jobs dispatched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Number of threads that currently have a live worker.
    pub fn active_workers(&self) -> usize {
        self.inner
            .mailboxes
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    /// Resolve once no job is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop all workers. Jobs not yet run stay persisted for `recover`.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.mailboxes.clear();
        debug!("maintenance queue shut down");
    }
}

fn spawn_worker<J: MaintenanceJobRepository + 'static>(
    inner: &Arc<QueueInner<J>>,
    thread_id: &ThreadId,
) -> mpsc::Sender<QueuedJob> {
    let (tx, rx) = mpsc::channel(inner.config.mailbox_capacity.max(1));
    tokio::spawn(run_worker(
        Arc::clone(inner),
        thread_id.clone(),
        rx,
        tx.downgrade(),
    ));
    debug!(thread_id = %thread_id, "spawned maintenance worker");
    tx
}

async fn run_worker<J: MaintenanceJobRepository + 'static>(
    inner: Arc<QueueInner<J>>,
    thread_id: ThreadId,
    mut rx: mpsc::Receiver<QueuedJob>,
    me: mpsc::WeakSender<QueuedJob>,
) {
    let idle_timeout = Duration::from_secs(inner.config.idle_timeout_secs);
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            next = tokio::time::timeout(idle_timeout, rx.recv()) => match next {
                Ok(Some(queued)) => {
                    inner.process(queued).await;
                    if rx.is_empty() {
                        inner.redispatch_overflow(&thread_id).await;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    if inner.redispatch_overflow(&thread_id).await {
                        continue;
                    }
                    // Senders only send while holding the map entry, so an
                    // empty mailbox checked under the entry lock stays empty.
                    let retired = inner.mailboxes.remove_if(&thread_id, |_, tx| {
                        rx.is_empty() && me.upgrade().is_some_and(|mine| mine.same_channel(tx))
                    });
                    if retired.is_some() {
                        break;
                    }
                }
            },
        }
    }

    // Anything still buffered belongs to a shut-down queue and stays persisted.
    rx.close();
    while rx.try_recv().is_ok() {
        inner.finish_one();
    }
    if let Some((_, count)) = inner.overflowed.remove(&thread_id) {
        (0..count).for_each(|_| inner.finish_one());
    }
    debug!(thread_id = %thread_id, "maintenance worker exited");
}

impl<J: MaintenanceJobRepository + 'static> QueueInner<J> {
    fn dispatch(self: &Arc<Self>, queued: QueuedJob) {
        if self.cancel.is_cancelled() {
            debug!(job_id = %queued.job.id, "queue is shut down; job stays persisted");
            return;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let thread_id = queued.job.thread_id.clone();
        let mut mailbox = self
            .mailboxes
            .entry(thread_id.clone())
            .or_insert_with(|| spawn_worker(self, &thread_id));

        let queued = match mailbox.try_send(queued) {
            Ok(()) => return,
            // The worker is gone; start a new one.
            Err(TrySendError::Closed(queued)) => {
                *mailbox = spawn_worker(self, &thread_id);
                match mailbox.try_send(queued) {
                    Ok(()) => return,
                    Err(TrySendError::Closed(q) | TrySendError::Full(q)) => q,
                }
            }
            Err(TrySendError::Full(queued)) => queued,
        };
        *self.overflowed.entry(thread_id.clone()).or_insert(0) += 1;
        drop(mailbox);

        warn!(
            job_id = %queued.job.id,
            thread_id = %thread_id,
            "maintenance mailbox full; job stays persisted until the worker drains"
        );
    }

    /// Re-dispatch the persisted jobs of a thread whose mailbox overflowed.
    ///
    /// Returns `false` when the thread had no overflow.
    async fn redispatch_overflow(self: &Arc<Self>, thread_id: &ThreadId) -> bool {
        let Some((_, count)) = self.overflowed.remove(thread_id) else {
            return false;
        };
        match self.jobs.list_pending(self.config.max_attempts).await {
            Ok(pending) => {
                let mut jobs: Vec<_> = pending
                    .into_iter()
                    .filter(|job| &job.thread_id == thread_id)
                    .collect();
                jobs.sort_by_key(|job| job.turn_id);
                debug!(thread_id = %thread_id, count = jobs.len(), "re-dispatching overflowed jobs");
                for job in jobs {
                    self.dispatch(QueuedJob { job, reply: None });
                }
            }
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "could not reload overflowed jobs; they stay persisted until recovery");
            }
        }
        (0..count).for_each(|_| self.finish_one());
        true
    }
}

impl<J: MaintenanceJobRepository> QueueInner<J> {
    async fn process(&self, queued: QueuedJob) {
        let QueuedJob { mut job, reply } = queued;

        if let Ok(wait) = (job.next_attempt_at - Utc::now()).to_std() {
            if !wait.is_zero() && !self.sleep_or_cancel(wait).await {
                self.finish_one();
                return;
            }
        }

        let outcome = loop {
            job.attempt_count += 1;
            job.last_attempt_at = Some(Utc::now());

            let error = match self.runner.run(&job).await {
                Ok(report) => {
                    if let Err(e) = self.jobs.delete(&job.id).await {
                        warn!(job_id = %job.id, error = %e, "failed to delete finished maintenance job");
                    }
                    break Ok(report);
                }
                Err(e) => e,
            };

            job.last_error = Some(error.to_string());
            if job.attempt_count >= self.config.max_attempts {
                warn!(
                    job_id = %job.id,
                    thread_id = %job.thread_id,
                    attempts = job.attempt_count,
                    error = %error,
                    "maintenance job abandoned"
                );
                self.persist_attempt(&job).await;
                break Err(error);
            }

            let delay = backoff_delay(self.config.retry_base_ms, job.attempt_count);
            job.next_attempt_at = TimeDelta::from_std(delay)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.persist_attempt(&job).await;
            warn!(
                job_id = %job.id,
                attempt = job.attempt_count,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "maintenance job failed; retrying"
            );
            if !self.sleep_or_cancel(delay).await {
                break Err(error);
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
        self.finish_one();
    }

    async fn persist_attempt(&self, job: &MaintenanceJob) {
        if let Err(e) = self.jobs.update(job).await {
            warn!(job_id = %job.id, error = %e, "failed to record maintenance attempt");
        }
    }

    /// Sleep for `delay`; returns `false` if the queue was shut down meanwhile.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}
