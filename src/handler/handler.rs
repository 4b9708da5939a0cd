//! Per-handler dispatch core.
//!
//! Each handler owns a bounded pending queue refilled lazily from its job
//! source, an in-progress table of dispatched jobs, and its lifecycle state.
//!
//! Lock discipline: all queue/table/state mutation happens under one
//! `std::sync::Mutex` per handler, never held across an await. The job
//! source sits behind a separate `tokio::sync::Mutex`, so refills serialize
//! against each other without stalling dispatch on other handlers, and a
//! state check and the matching queue mutation always share one critical
//! section. A job id is in at most one of {pending, in_progress} at any
//! time.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{Lifecycle, LifecycleState};
use super::{DispatchError, Result};
use crate::jobs::{DispatchCounters, HandlerStats, Job, JobResult};
use crate::sources::JobSource;

struct Assignment {
    job: Job,
    client_id: Uuid,
    dispatched_at: Instant,
}

struct HandlerCore {
    lifecycle: Lifecycle,
    pending: VecDeque<Job>,
    in_progress: HashMap<Uuid, Assignment>,
    counters: DispatchCounters,
    source_exhausted: bool,
    finished_logged: bool,
}

impl HandlerCore {
    fn is_finished(&self) -> bool {
        self.source_exhausted && self.pending.is_empty() && self.in_progress.is_empty()
    }
}

/// Outcome of applying one job result.
#[derive(Clone, Copy, Debug)]
pub struct ResultOutcome {
    pub success: bool,
    /// Result came from a different client than the job was dispatched to.
    /// Counted anyway; accounting is best-effort under network reordering.
    pub client_mismatch: bool,
}

pub struct JobHandler {
    pub id: Uuid,
    pub package_name: String,
    pub job_type: String,
    core: Mutex<HandlerCore>,
    source: AsyncMutex<Box<dyn JobSource>>,
    queue_low_water: usize,
}

impl JobHandler {
    pub fn new(
        package_name: String,
        job_type: String,
        source: Box<dyn JobSource>,
        queue_low_water: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            package_name,
            job_type,
            core: Mutex::new(HandlerCore {
                lifecycle: Lifecycle::new(),
                pending: VecDeque::new(),
                in_progress: HashMap::new(),
                counters: DispatchCounters::default(),
                source_exhausted: false,
                finished_logged: false,
            }),
            source: AsyncMutex::new(source),
            queue_low_water: queue_low_water.max(1),
        }
    }

    fn lock_core(&self) -> std::sync::MutexGuard<'_, HandlerCore> {
        self.core.lock().expect("handler core lock poisoned")
    }

    pub fn state(&self) -> LifecycleState {
        self.lock_core().lifecycle.state()
    }

    /// Dispatch the next pending job to `client_id`, refilling the queue
    /// from the source once if it is empty. Returns `None` when the handler
    /// is not running or has no work.
    pub async fn next_job(&self, client_id: Uuid) -> Option<Job> {
        if let Some(job) = self.try_dispatch(client_id) {
            return Some(job);
        }

        self.refill().await;

        let job = self.try_dispatch(client_id);
        if job.is_none() {
            self.note_if_finished();
        }
        job
    }

    /// Pop the queue head under the core lock. State check and dequeue share
    /// the critical section so stop/remove cannot race a dispatch.
    fn try_dispatch(&self, client_id: Uuid) -> Option<Job> {
        let mut core = self.lock_core();
        if !core.lifecycle.is_running() {
            return None;
        }
        let job = core.pending.pop_front()?;
        core.in_progress.insert(
            job.id,
            Assignment {
                job: job.clone(),
                client_id,
                dispatched_at: Instant::now(),
            },
        );
        core.counters.total_dispatched += 1;
        debug!(handler_id = %self.id, job_id = %job.id, %client_id, "Dispatched job");
        Some(job)
    }

    /// Pull up to `queue_low_water` payloads from the source. The source
    /// lock serializes concurrent refills, so two callers racing on an empty
    /// queue never double-pull the source.
    async fn refill(&self) {
        let mut source = self.source.lock().await;

        // Another caller may have refilled while we waited for the source.
        {
            let core = self.lock_core();
            if !core.pending.is_empty() || core.source_exhausted || !core.lifecycle.is_running() {
                return;
            }
        }

        let mut batch = Vec::new();
        let mut exhausted = false;
        while batch.len() < self.queue_low_water {
            match source.produce_next().await {
                Some(payload) => batch.push(payload),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let mut core = self.lock_core();
        if exhausted {
            core.source_exhausted = true;
        }
        // The handler may have been stopped mid-refill; stopped handlers
        // abandon their queue, so the batch is dropped with it.
        if core.lifecycle.is_running() {
            let produced = batch.len();
            for payload in batch {
                let job = Job::new(self.id, payload);
                core.pending.push_back(job);
            }
            debug!(handler_id = %self.id, produced, exhausted, "Refilled pending queue");
        }
    }

    fn note_if_finished(&self) {
        let mut core = self.lock_core();
        if core.is_finished() && !core.finished_logged {
            core.finished_logged = true;
            info!(handler_id = %self.id, "Handler finished: source exhausted, no jobs in flight");
        }
    }

    /// Apply a client result to an in-progress job.
    ///
    /// Unknown ids are errors for the caller to drop silently; a client
    /// mismatch is flagged in the outcome but still counted.
    pub async fn apply_result(&self, result: &JobResult) -> Result<ResultOutcome> {
        let outcome = {
            let mut core = self.lock_core();
            let assignment = core
                .in_progress
                .remove(&result.job_id)
                .ok_or(DispatchError::UnknownJob(result.job_id))?;

            if result.success {
                core.counters.total_succeeded += 1;
            } else {
                core.counters.total_failed += 1;
            }

            ResultOutcome {
                success: result.success,
                client_mismatch: assignment.client_id != result.client_id,
            }
        };

        if outcome.client_mismatch {
            warn!(
                handler_id = %self.id,
                job_id = %result.job_id,
                client_id = %result.client_id,
                "Result arrived from a client other than the dispatcher"
            );
        }

        // Sink failures are the source's problem; never a core error.
        self.source.lock().await.consume_result(result.output.clone()).await;

        self.note_if_finished();
        Ok(outcome)
    }

    /// Move in-progress jobs older than `timeout` back to the head of the
    /// pending queue so another client can pick them up. Returns the number
    /// requeued.
    pub fn requeue_expired(&self, timeout: Duration) -> usize {
        let mut core = self.lock_core();
        let now = Instant::now();
        let expired: Vec<Uuid> = core
            .in_progress
            .iter()
            .filter(|(_, a)| now.duration_since(a.dispatched_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        for job_id in &expired {
            let assignment = core.in_progress.remove(job_id).expect("id collected above");
            warn!(
                handler_id = %self.id,
                %job_id,
                client_id = %assignment.client_id,
                "Job timed out in progress, requeueing"
            );
            core.pending.push_front(assignment.job);
        }
        expired.len()
    }

    pub fn start(&self) -> Result<()> {
        self.lock_core().lifecycle.start()
    }

    /// Stop dispatch and abandon all queued and in-flight jobs. Returns the
    /// abandoned job ids so the owner can drop its routing entries; late
    /// results for them become `UnknownJob` and are ignored for statistics.
    pub fn stop(&self) -> Result<Vec<Uuid>> {
        let mut core = self.lock_core();
        core.lifecycle.stop()?;
        let abandoned = Self::drain_jobs(&mut core);
        if !abandoned.is_empty() {
            info!(handler_id = %self.id, abandoned = abandoned.len(), "Stopped handler, jobs abandoned");
        }
        Ok(abandoned)
    }

    pub fn pause(&self) -> Result<()> {
        self.lock_core().lifecycle.pause()
    }

    pub fn disable(&self) -> Result<()> {
        self.lock_core().lifecycle.disable()
    }

    pub fn enable(&self) -> Result<()> {
        self.lock_core().lifecycle.enable()
    }

    /// Discard all job state for removal. Fails with `HandlerBusy` unless
    /// the handler is stopped or disabled.
    pub fn prepare_remove(&self) -> Result<Vec<Uuid>> {
        let mut core = self.lock_core();
        core.lifecycle.ensure_removable()?;
        Ok(Self::drain_jobs(&mut core))
    }

    fn drain_jobs(core: &mut HandlerCore) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = core.pending.drain(..).map(|j| j.id).collect();
        ids.extend(core.in_progress.drain().map(|(id, _)| id));
        ids
    }

    pub fn stats(&self) -> HandlerStats {
        let core = self.lock_core();
        HandlerStats {
            id: self.id,
            package_name: self.package_name.clone(),
            job_type: self.job_type.clone(),
            state: core.lifecycle.state(),
            finished: core.is_finished(),
            pending: core.pending.len(),
            in_progress: core.in_progress.len(),
            counters: core.counters,
        }
    }
}
