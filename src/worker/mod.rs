//! Worker that serves build and model requests
//!
//! A [`Worker`] owns the engine factory, the model pipeline and the logging
//! scope of one connection. It is only ever driven from the single command
//! task in [`actor`], so engine state is never touched by two requests at
//! once.
//!
//! Each request runs inside a guarded region: errors and panics raised while
//! translating parameters, wiring listeners or driving the engine are turned
//! into a failure for the request's handler, and the worker keeps serving.

mod actor;
mod model;

pub(crate) use actor::{WorkerCommand, WorkerHandle};
pub use model::{
    DefaultModelBuilder, EnvironmentPreparer, ModelOptions, ModelPipeline, ModelTransform,
    NoopPreparer,
};

use crate::engine::{BuildEngine, BuildEngineFactory, LoggingScope, StartConfiguration};
use crate::error::{ConnectionError, Result};
use crate::monitoring::WorkerStats;
use crate::protocol::{BuildParameters, HandlerGuard, ModelKind, OperationParameters, ProjectModel};
use crate::translate;
use model::ModelBuildingListener;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Executes requests against fresh engine instances
pub(crate) struct Worker {
    factory: Arc<dyn BuildEngineFactory>,
    pipeline: ModelPipeline,
    logging: LoggingScope,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub(crate) fn new(
        factory: Arc<dyn BuildEngineFactory>,
        pipeline: ModelPipeline,
        logging: LoggingScope,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            factory,
            pipeline,
            logging,
            stats,
        }
    }

    pub(crate) fn logging(&self) -> &LoggingScope {
        &self.logging
    }

    /// Serve one command from the mailbox
    pub(crate) fn dispatch(&self, command: WorkerCommand) {
        let _span = self.logging.span().enter();

        match command {
            WorkerCommand::BuildModel {
                kind,
                parameters,
                handler,
            } => self.build_model(kind, parameters, handler),
            WorkerCommand::Build {
                build,
                parameters,
                handler,
            } => self.build(build, parameters, handler),
        }
    }

    /// Build a model of `kind` and hand it to the handler
    pub(crate) fn build_model(
        &self,
        kind: ModelKind,
        parameters: OperationParameters,
        handler: HandlerGuard<ProjectModel>,
    ) {
        info!("Fetching {} model for {:?}", kind, parameters.project_dir());
        let outcome = guarded(|| self.run_build_model(kind, &parameters));
        self.finish("model fetch", handler, outcome);
    }

    /// Execute a build and notify the handler
    pub(crate) fn build(
        &self,
        build: BuildParameters,
        parameters: OperationParameters,
        handler: HandlerGuard<()>,
    ) {
        info!(
            "Executing build {:?} for {:?}",
            build.tasks(),
            parameters.project_dir()
        );
        let outcome = guarded(|| self.run_build(&build, &parameters));
        self.finish("build", handler, outcome);
    }

    fn run_build(&self, build: &BuildParameters, parameters: &OperationParameters) -> Result<()> {
        let mut config = translate::to_start_configuration(parameters);
        config.task_names = build.tasks().to_vec();

        let mut engine = self.new_engine(config)?;
        let _progress = translate::attach_listeners(parameters, engine.as_mut(), &self.logging);

        wrap_failure(engine.run())
    }

    fn run_build_model(
        &self,
        kind: ModelKind,
        parameters: &OperationParameters,
    ) -> Result<ProjectModel> {
        if !self.pipeline.supports(kind) {
            return Err(ConnectionError::UnsupportedOperation(format!(
                "Cannot build model of type '{}'.",
                kind
            )));
        }

        let config = translate::to_start_configuration(parameters);
        let mut engine = self.new_engine(config)?;
        let _progress = translate::attach_listeners(parameters, engine.as_mut(), &self.logging);

        let options = ModelOptions::for_kind(kind);
        let listener = Arc::new(ModelBuildingListener::new(self.pipeline.clone(), options));
        engine.add_build_listener(listener.clone());

        wrap_failure(engine.build_analysis())?;

        let model = listener.take_model()?;
        if !model.satisfies(kind) {
            return Err(ConnectionError::UnsupportedOperation(format!(
                "Cannot build model of type '{}': the built model only provides {:?}.",
                kind,
                model.capabilities()
            )));
        }

        Ok(model)
    }

    fn new_engine(&self, config: StartConfiguration) -> Result<Box<dyn BuildEngine>> {
        debug!("Creating engine instance for {:?}", config.project_dir);
        let engine = self
            .factory
            .new_instance(config, &self.logging)
            .map_err(|e| {
                ConnectionError::Unexpected(format!("Failed to create build engine: {}", e))
            })?;
        self.stats.record_engine_created();
        Ok(engine)
    }

    fn finish<T>(&self, operation: &str, handler: HandlerGuard<T>, outcome: Result<T>) {
        match &outcome {
            Ok(_) => info!("{} completed successfully", operation),
            Err(e) => error!("{} failed: {}", operation, e),
        }
        self.stats.record_outcome(outcome.is_ok());

        // A panicking client handler must not take the worker down with it
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler.deliver(outcome))) {
            warn!(
                "Result handler for {} panicked: {}",
                operation,
                panic_message(panic.as_ref())
            );
        }
    }
}

/// Run `operation`, converting a panic into an unexpected failure
fn guarded<T>(operation: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(operation)).unwrap_or_else(|panic| {
        Err(ConnectionError::Unexpected(panic_message(panic.as_ref())))
    })
}

fn wrap_failure(result: crate::engine::BuildResult) -> Result<()> {
    match result.into_failure() {
        Some(cause) => Err(ConnectionError::build_failure(cause)),
        None => Ok(()),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker operation panicked".to_string()
    }
}
