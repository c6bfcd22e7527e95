//! Versioned protocol surface
//!
//! This module defines everything a client can ask of a connection and
//! everything a connection can answer. Clients and workers built against
//! different releases interoperate as long as neither side references a
//! model tag or parameter field the other does not know; unknown tags are
//! answered with [`ConnectionError::UnsupportedOperation`].
//!
//! [`ConnectionError::UnsupportedOperation`]: crate::error::ConnectionError::UnsupportedOperation

mod handler;
mod model;
mod params;

pub use handler::{channel_handler, handler_fn, FnHandler, ResultHandler};
pub(crate) use handler::HandlerGuard;
pub use model::{
    Capabilities, ExternalDependency, ModelKind, ProjectDependency, ProjectModel, TaskModel,
    UnknownModelKind,
};
pub use params::{
    BuildParameters, ModelFetchParameters, OperationParameters, ProgressListener, SharedWriter,
};

use crate::error::Result;

/// A connection to a particular build engine implementation.
///
/// DO NOT CHANGE the existing methods of this trait. It is part of the
/// cross-version protocol: operations may be added, never altered.
pub trait BuildConnection: Send + Sync {
    /// Stops this connection. Later model and build requests fail with
    /// `IllegalState`.
    ///
    /// By default this only closes the worker mailbox and returns: requests
    /// already queued are still served, each with its callback, after `stop`
    /// has returned. Set `ConnectionConfig::join_on_stop` to block until the
    /// worker thread has drained them (skipped when called from a callback).
    fn stop(&self);

    /// Returns the version this connection implements. Fast, and keeps
    /// working after the connection has been stopped.
    fn get_version(&self) -> String;

    /// Returns a display name for logging and error reporting. Fast, and
    /// keeps working after the connection has been stopped.
    fn get_display_name(&self) -> String;

    /// Starts fetching a snapshot of the project model. Returns as soon as
    /// the request is queued; `handler` is notified when the model is
    /// available.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` when the model type is unknown, `IllegalState`
    /// when the connection has been stopped.
    fn get_model(
        &self,
        fetch_parameters: ModelFetchParameters,
        operation_parameters: OperationParameters,
        handler: Box<dyn ResultHandler<ProjectModel>>,
    ) -> Result<()>;

    /// Starts the execution of a build. Returns as soon as the request is
    /// queued; `handler` is notified when the build is complete.
    ///
    /// # Errors
    ///
    /// `IllegalState` when the connection has been stopped.
    fn execute_build(
        &self,
        build_parameters: BuildParameters,
        operation_parameters: OperationParameters,
        handler: Box<dyn ResultHandler<()>>,
    ) -> Result<()>;
}
