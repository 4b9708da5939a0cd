//! Handler manager: owns the handler collection, routes lifecycle commands,
//! and implements the job-pull / result-push protocol across all handlers.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::{JobHandler, ResultOutcome};
use super::state::LifecycleState;
use super::{DispatchError, Result};
use crate::config::DispatchConfig;
use crate::jobs::{HandlerJobInfo, HandlerStats, Job, JobResult, JobScriptInfo};
use crate::packages::{PackageError, PackageStore};
use crate::sources::{SourceError, SourceRegistry};

pub struct HandlerManager {
    /// Lock-free collection: add/remove never block unrelated lookups.
    handlers: DashMap<Uuid, Arc<JobHandler>>,
    /// jobId -> handlerId, for O(1) result routing. Entries live from
    /// dispatch until the job is resolved or abandoned.
    job_index: DashMap<Uuid, Uuid>,
    packages: Arc<PackageStore>,
    sources: Arc<SourceRegistry>,
    dispatch: DispatchConfig,
}

impl HandlerManager {
    pub fn new(
        packages: Arc<PackageStore>,
        sources: Arc<SourceRegistry>,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            handlers: DashMap::new(),
            job_index: DashMap::new(),
            packages,
            sources,
            dispatch,
        }
    }

    /// Resolve the job script against the package store and the source
    /// registry, then construct a stopped handler with a fresh id.
    pub fn add(&self, script: &JobScriptInfo) -> Result<Uuid> {
        self.packages.info(&script.package_name).map_err(|err| match err {
            PackageError::NotFound(_) => DispatchError::PackageNotFound(script.package_name.clone()),
            other => DispatchError::InvalidJobScript(other.to_string()),
        })?;

        let source = self
            .sources
            .create(&script.package_name, &script.job_type, &script.settings)
            .map_err(|err| match err {
                SourceError::UnknownJobType { package, job_type } => {
                    DispatchError::HandlerTypeNotFound { package, job_type }
                }
                SourceError::InvalidSettings(msg) => DispatchError::InvalidJobScript(msg),
            })?;

        let handler = Arc::new(JobHandler::new(
            script.package_name.clone(),
            script.job_type.clone(),
            source,
            self.dispatch.queue_low_water,
        ));
        let id = handler.id;
        self.handlers.insert(id, handler);
        info!(handler_id = %id, package = %script.package_name, job_type = %script.job_type, "Added handler");
        Ok(id)
    }

    fn get(&self, id: Uuid) -> Result<Arc<JobHandler>> {
        self.handlers
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(DispatchError::HandlerNotFound(id))
    }

    pub fn start(&self, id: Uuid) -> Result<()> {
        self.get(id)?.start()
    }

    pub fn stop(&self, id: Uuid) -> Result<()> {
        let abandoned = self.get(id)?.stop()?;
        self.forget_jobs(&abandoned);
        Ok(())
    }

    pub fn pause(&self, id: Uuid) -> Result<()> {
        self.get(id)?.pause()
    }

    pub fn disable(&self, id: Uuid) -> Result<()> {
        self.get(id)?.disable()
    }

    pub fn enable(&self, id: Uuid) -> Result<()> {
        self.get(id)?.enable()
    }

    /// Destroy a handler and discard its queue. `HandlerBusy` while it is
    /// running or paused.
    pub fn remove(&self, id: Uuid) -> Result<()> {
        let handler = self.get(id)?;
        let abandoned = handler.prepare_remove()?;
        self.forget_jobs(&abandoned);
        self.handlers.remove(&id);
        info!(handler_id = %id, "Removed handler");
        Ok(())
    }

    /// First available job across running, non-disabled handlers, visited in
    /// a stable id-sorted order. Cross-handler fairness beyond that is a
    /// configuration point, not fixed here.
    pub async fn get_job(&self, client_id: Uuid) -> Option<Job> {
        for handler in self.handlers_in_order() {
            if handler.state() != LifecycleState::Running {
                continue;
            }
            if let Some(job) = handler.next_job(client_id).await {
                self.job_index.insert(job.id, handler.id);
                return Some(job);
            }
        }
        None
    }

    /// Route a result to the owning handler. Unknown and stale job ids are
    /// `UnknownJob`; callers treat that as a silent drop.
    pub async fn process_result(&self, result: &JobResult) -> Result<ResultOutcome> {
        let handler_id = self
            .job_index
            .get(&result.job_id)
            .map(|entry| *entry.value())
            .ok_or(DispatchError::UnknownJob(result.job_id))?;

        let handler = match self.get(handler_id) {
            Ok(handler) => handler,
            Err(_) => {
                // Handler vanished between dispatch and result; drop the
                // stale index entry.
                self.job_index.remove(&result.job_id);
                return Err(DispatchError::UnknownJob(result.job_id));
            }
        };

        let outcome = handler.apply_result(result).await;
        match &outcome {
            Ok(_) => {
                self.job_index.remove(&result.job_id);
            }
            Err(DispatchError::UnknownJob(_)) => {
                // Requeued or abandoned since dispatch; if it is pending
                // again the index entry stays for the next dispatch.
                debug!(job_id = %result.job_id, "Late or duplicate result dropped");
            }
            Err(_) => {}
        }
        outcome
    }

    /// Per-handler statistics snapshot. Each handler is locked briefly in
    /// turn; no lock is held across handlers, so dispatch never stalls on a
    /// reader.
    pub fn get_statistics(&self) -> Vec<HandlerStats> {
        self.handlers_in_order()
            .iter()
            .map(|handler| handler.stats())
            .collect()
    }

    /// What a client needs to run jobs for this handler.
    pub fn get_handler_job_info(&self, id: Uuid) -> Result<HandlerJobInfo> {
        let handler = self.get(id)?;
        let package = self
            .packages
            .info(&handler.package_name)
            .map_err(|_| DispatchError::PackageNotFound(handler.package_name.clone()))?;
        Ok(HandlerJobInfo {
            handler_id: id,
            package_name: package.name,
            handler_files: package.handler_files,
            dependency_files: package.dependency_files,
        })
    }

    pub fn get_package_name(&self, id: Uuid) -> Result<String> {
        Ok(self.get(id)?.package_name.clone())
    }

    /// Periodic sweep entry point: requeue in-progress jobs older than the
    /// configured timeout across all handlers.
    pub fn requeue_expired(&self) -> usize {
        let timeout = self.dispatch.job_timeout();
        self.sweep(timeout)
    }

    fn sweep(&self, timeout: Duration) -> usize {
        let mut total = 0;
        for handler in self.handlers_in_order() {
            total += handler.requeue_expired(timeout);
        }
        if total > 0 {
            warn!(requeued = total, "Requeued timed-out jobs");
        }
        total
    }

    /// Best-effort stop of every handler and release of routing state.
    pub fn teardown(&self) {
        for handler in self.handlers_in_order() {
            match handler.stop() {
                Ok(abandoned) => self.forget_jobs(&abandoned),
                // Already stopped or disabled; nothing to abandon.
                Err(_) => {}
            }
        }
        self.job_index.clear();
        info!("Handler manager torn down");
    }

    fn handlers_in_order(&self) -> Vec<Arc<JobHandler>> {
        let mut handlers: Vec<Arc<JobHandler>> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handlers.sort_by_key(|h| h.id);
        handlers
    }

    fn forget_jobs(&self, job_ids: &[Uuid]) {
        for job_id in job_ids {
            self.job_index.remove(job_id);
        }
    }
}
