//! Client-facing connection
//!
//! [`DefaultConnection`] implements [`BuildConnection`] on top of a single
//! worker thread that is spawned on first use. All model and build requests
//! of one connection go through that worker, in submission order.

use crate::config::{ConnectionConfig, QueuePolicy};
use crate::engine::{BuildEngineFactory, LoggingScope};
use crate::error::{ConnectionError, Result};
use crate::monitoring::{StatsSnapshot, WorkerStats};
use crate::protocol::{
    BuildConnection, BuildParameters, HandlerGuard, ModelFetchParameters, OperationParameters,
    ProjectModel, ResultHandler,
};
use crate::worker::{
    EnvironmentPreparer, ModelPipeline, ModelTransform, Worker, WorkerCommand, WorkerHandle,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No request has been made yet
    Unstarted,
    /// Worker is running
    Active,
    /// Connection is stopped
    Stopped,
}

impl ConnectionState {
    /// Check if the connection accepts new requests
    pub fn accepts_requests(&self) -> bool {
        !matches!(self, ConnectionState::Stopped)
    }

    /// Check if a worker is running
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Active)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Unstarted => write!(f, "unstarted"),
            ConnectionState::Active => write!(f, "active"),
            ConnectionState::Stopped => write!(f, "stopped"),
        }
    }
}

struct ConnectionInner {
    state: ConnectionState,
    worker: Option<WorkerHandle>,
}

/// Default [`BuildConnection`] implementation
pub struct DefaultConnection {
    config: ConnectionConfig,
    factory: Arc<dyn BuildEngineFactory>,
    pipeline: ModelPipeline,
    stats: Arc<WorkerStats>,
    inner: Mutex<ConnectionInner>,
}

impl DefaultConnection {
    /// Create a connection with default configuration and model pipeline
    pub fn new(factory: Arc<dyn BuildEngineFactory>) -> Self {
        Self::with_parts(factory, ConnectionConfig::default(), ModelPipeline::default())
    }

    /// Start building a connection
    pub fn builder(factory: Arc<dyn BuildEngineFactory>) -> ConnectionBuilder {
        ConnectionBuilder::new(factory)
    }

    fn with_parts(
        factory: Arc<dyn BuildEngineFactory>,
        config: ConnectionConfig,
        pipeline: ModelPipeline,
    ) -> Self {
        Self {
            config,
            factory,
            pipeline,
            stats: Arc::new(WorkerStats::new()),
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Unstarted,
                worker: None,
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Request counters of this connection
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Configuration this connection was built with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a pending slot according to the queue policy
    fn reserve(&self) -> Result<()> {
        match self.config.queue_policy {
            QueuePolicy::Queue => {
                self.stats.reserve();
                Ok(())
            }
            QueuePolicy::RejectWhenBusy => {
                if self.stats.try_reserve_exclusive() {
                    Ok(())
                } else {
                    Err(ConnectionError::Busy(format!(
                        "{} is already executing an operation",
                        self.config.display_name
                    )))
                }
            }
        }
    }

    /// Hand a request to the worker, starting it if needed
    ///
    /// `make_command` is only invoked once the request has been accepted, so
    /// a rejected request never consumes the client's handler.
    fn submit(&self, make_command: impl FnOnce() -> WorkerCommand) -> Result<()> {
        let mut inner = self.lock();

        if !inner.state.accepts_requests() {
            return Err(ConnectionError::IllegalState(format!(
                "Cannot use {} as it has been stopped.",
                self.config.display_name
            )));
        }

        self.reserve()?;

        if inner.worker.is_none() {
            match self.start_worker() {
                Ok(handle) => {
                    inner.worker = Some(handle);
                    inner.state = ConnectionState::Active;
                }
                Err(e) => {
                    self.stats.release();
                    return Err(e);
                }
            }
        }

        let outcome = match inner.worker.as_ref() {
            Some(worker) => worker.submit(make_command()),
            None => Err(ConnectionError::IllegalState(
                "Worker is not running".to_string(),
            )),
        };

        match outcome {
            Ok(()) => {
                self.stats.record_submitted();
                Ok(())
            }
            Err(e) => {
                self.stats.release();
                Err(e)
            }
        }
    }

    fn start_worker(&self) -> Result<WorkerHandle> {
        let logging = LoggingScope::new();
        info!(
            "Starting worker for {} (logging scope {})",
            self.config.display_name,
            logging.id()
        );

        let worker = Worker::new(
            self.factory.clone(),
            self.pipeline.clone(),
            logging,
            self.stats.clone(),
        );
        WorkerHandle::spawn(worker, &self.config.worker_thread_name)
    }
}

impl BuildConnection for DefaultConnection {
    fn stop(&self) {
        let worker = {
            let mut inner = self.lock();
            let previous = inner.state;
            inner.state = ConnectionState::Stopped;
            if previous != ConnectionState::Stopped {
                info!("Stopping {} ({})", self.config.display_name, previous);
            }
            inner.worker.take()
        };

        match worker {
            Some(worker) => worker.shutdown(self.config.join_on_stop),
            None => debug!("No worker to stop for {}", self.config.display_name),
        }
    }

    fn get_version(&self) -> String {
        crate::VERSION.to_string()
    }

    fn get_display_name(&self) -> String {
        self.config.display_name.clone()
    }

    fn get_model(
        &self,
        fetch_parameters: ModelFetchParameters,
        operation_parameters: OperationParameters,
        handler: Box<dyn ResultHandler<ProjectModel>>,
    ) -> Result<()> {
        if !self.state().accepts_requests() {
            return Err(ConnectionError::IllegalState(format!(
                "Cannot use {} as it has been stopped.",
                self.config.display_name
            )));
        }

        let kind = fetch_parameters.kind().map_err(|e| {
            warn!("Rejecting model request: {}", e);
            e
        })?;

        debug!("Submitting {} model request", kind);
        self.submit(move || WorkerCommand::BuildModel {
            kind,
            parameters: operation_parameters,
            handler: HandlerGuard::new(handler, "model fetch"),
        })
    }

    fn execute_build(
        &self,
        build_parameters: BuildParameters,
        operation_parameters: OperationParameters,
        handler: Box<dyn ResultHandler<()>>,
    ) -> Result<()> {
        debug!("Submitting build request {:?}", build_parameters.tasks());
        self.submit(move || WorkerCommand::Build {
            build: build_parameters,
            parameters: operation_parameters,
            handler: HandlerGuard::new(handler, "build"),
        })
    }
}

impl Drop for DefaultConnection {
    fn drop(&mut self) {
        let worker = self.lock().worker.take();
        if let Some(worker) = worker {
            debug!("Connection dropped, closing worker mailbox");
            worker.shutdown(false);
        }
    }
}

/// Builder for [`DefaultConnection`]
pub struct ConnectionBuilder {
    factory: Arc<dyn BuildEngineFactory>,
    config: ConnectionConfig,
    preparer: Option<Arc<dyn EnvironmentPreparer>>,
    transform: Option<Arc<dyn ModelTransform>>,
}

impl ConnectionBuilder {
    /// Start from default configuration
    pub fn new(factory: Arc<dyn BuildEngineFactory>) -> Self {
        Self {
            factory,
            config: ConnectionConfig::default(),
            preparer: None,
            transform: None,
        }
    }

    /// Use `config`
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Prepare analyzed projects with `preparer` before building models
    pub fn environment_preparer(mut self, preparer: Arc<dyn EnvironmentPreparer>) -> Self {
        self.preparer = Some(preparer);
        self
    }

    /// Build models with `transform`
    pub fn model_transform(mut self, transform: Arc<dyn ModelTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Validate the configuration and create the connection
    pub fn build(self) -> Result<DefaultConnection> {
        self.config.validate()?;

        let defaults = ModelPipeline::default();
        let pipeline = ModelPipeline::new(
            self.preparer.unwrap_or(defaults.preparer),
            self.transform.unwrap_or(defaults.transform),
        );

        Ok(DefaultConnection::with_parts(
            self.factory,
            self.config,
            pipeline,
        ))
    }
}
