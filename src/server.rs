//! Server facade: composes the package store, handler manager, and client
//! registry, and exposes the operation set consumed by the transport layer.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::handler::{DispatchError, HandlerManager};
use crate::jobs::{
    ClientInfo, HandlerJobInfo, Job, JobResult, JobScriptInfo, ServerInfo,
};
use crate::observability::Metrics;
use crate::packages::{PackageError, PackageInfo, PackageStore};
use crate::sources::SourceRegistry;
use crate::telemetry;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// The entire boundary exposed to the transport layer. All registries are
/// constructed here and passed down explicitly; there are no ambient
/// singletons.
pub struct Server {
    config: Config,
    packages: Arc<PackageStore>,
    manager: Arc<HandlerManager>,
    clients: Arc<ClientRegistry>,
    metrics: Arc<Metrics>,
    sweep: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Build a server whose source registry holds only the built-ins.
    pub fn new(config: Config) -> Result<Self> {
        let registry = SourceRegistry::with_builtins("core");
        Self::with_sources(config, registry)
    }

    /// Build a server with an explicit source capability table. This is the
    /// plugin seam: job-generation logic for uploaded packages is registered
    /// here once, at construction.
    pub fn with_sources(config: Config, sources: SourceRegistry) -> Result<Self> {
        let packages = Arc::new(PackageStore::open(
            &config.server.packages_path,
            config.server.max_unpacked_bytes,
        )?);
        let manager = Arc::new(HandlerManager::new(
            Arc::clone(&packages),
            Arc::new(sources),
            config.dispatch.clone(),
        ));
        Ok(Self {
            config,
            packages,
            manager,
            clients: Arc::new(ClientRegistry::new()),
            metrics: Arc::new(Metrics::new()),
            sweep: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the subsystem: spawns the periodic timeout-requeue sweep.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut sweep = self.sweep.lock().expect("sweep handle lock poisoned");
        if sweep.is_some() {
            return;
        }
        let manager = Arc::clone(&self.manager);
        let interval = self.config.dispatch.sweep_interval();
        *sweep = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                manager.requeue_expired();
            }
        }));
        info!(sweep_interval_secs = self.config.dispatch.sweep_interval_secs, "Server started");
    }

    /// Stop the subsystem. Safe to call with requests in flight: they either
    /// complete against the pre-stop state or see stopped handlers.
    pub fn stop(&self) {
        if let Some(handle) = self.sweep.lock().expect("sweep handle lock poisoned").take() {
            handle.abort();
        }
        self.manager.teardown();
        info!("Server stopped");
    }

    /// Aggregate statistics snapshot: handlers, clients, host resources,
    /// process-wide dispatch counters.
    pub fn get_statistics(&self) -> ServerInfo {
        ServerInfo {
            handlers: self.manager.get_statistics(),
            clients: self.clients.snapshot(),
            resources: telemetry::collect(),
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn register_package(&self, info: &PackageInfo, archive: &[u8]) -> Result<()> {
        self.packages.register(info, archive)?;
        self.metrics.package_registered();
        Ok(())
    }

    pub fn get_registered_packages(&self) -> Result<Vec<PackageInfo>> {
        Ok(self.packages.list_all()?)
    }

    pub fn add_job_script(&self, script: &JobScriptInfo) -> Result<Uuid> {
        Ok(self.manager.add(script)?)
    }

    pub fn remove_job_script(&self, handler_id: Uuid) -> bool {
        self.lifecycle_op("remove", handler_id, self.manager.remove(handler_id))
    }

    pub fn start_job_script(&self, handler_id: Uuid) -> bool {
        self.lifecycle_op("start", handler_id, self.manager.start(handler_id))
    }

    pub fn stop_job_script(&self, handler_id: Uuid) -> bool {
        self.lifecycle_op("stop", handler_id, self.manager.stop(handler_id))
    }

    pub fn pause_job_script(&self, handler_id: Uuid) -> bool {
        self.lifecycle_op("pause", handler_id, self.manager.pause(handler_id))
    }

    pub fn disable_job_script(&self, handler_id: Uuid) -> bool {
        self.lifecycle_op("disable", handler_id, self.manager.disable(handler_id))
    }

    pub fn enable_job_script(&self, handler_id: Uuid) -> bool {
        self.lifecycle_op("enable", handler_id, self.manager.enable(handler_id))
    }

    fn lifecycle_op(
        &self,
        op: &'static str,
        handler_id: Uuid,
        result: std::result::Result<(), DispatchError>,
    ) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(%handler_id, %err, "Handler {op} rejected");
                false
            }
        }
    }

    /// Pull the next available job for a client.
    pub async fn get_job(&self, client_id: Uuid) -> Option<Job> {
        self.clients.touch_id(client_id);
        info!(%client_id, "Client requested a job");
        let job = self.manager.get_job(client_id).await?;
        self.clients.job_dispatched(client_id);
        self.metrics.job_dispatched();
        Some(job)
    }

    pub fn get_handler_job_info(&self, handler_id: Uuid) -> Result<HandlerJobInfo> {
        Ok(self.manager.get_handler_job_info(handler_id)?)
    }

    /// Fetch a file from the package backing the given handler.
    pub fn get_file(&self, handler_id: Uuid, file_name: &str) -> Result<Vec<u8>> {
        let package_name = self.manager.get_package_name(handler_id)?;
        Ok(self.packages.read_file(&package_name, file_name)?)
    }

    /// Accept a result from a client. Returns `true` if a handler recognized
    /// the job; late and duplicate results return `false` and leave all
    /// counters untouched except the sender's in-progress figure.
    pub async fn receive_result(&self, result: &JobResult) -> bool {
        self.clients.touch_id(result.client_id);
        self.metrics.result_received();
        match self.manager.process_result(result).await {
            Ok(outcome) => {
                self.clients
                    .result_received(result.client_id, outcome.success, true);
                true
            }
            Err(DispatchError::UnknownJob(_)) => {
                self.clients.result_received(result.client_id, result.success, false);
                self.metrics.result_dropped();
                false
            }
            Err(err) => {
                warn!(job_id = %result.job_id, %err, "Result rejected");
                false
            }
        }
    }

    /// Registration/heartbeat from a client.
    pub fn received_client_info(&self, info: &ClientInfo) {
        self.clients.touch(info);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Ok(mut sweep) = self.sweep.lock() {
            if let Some(handle) = sweep.take() {
                handle.abort();
            }
        }
    }
}
