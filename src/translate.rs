//! Operation parameter translation
//!
//! Converts client-facing [`OperationParameters`] into the engine's
//! [`StartConfiguration`] and wires the client's sinks onto an engine
//! instance.

use crate::engine::{
    BuildEngine, ListenerRegistration, LoggingScope, ProgressStartFilter, StartConfiguration,
    StreamBackedListener,
};
use crate::protocol::OperationParameters;
use std::sync::Arc;
use tracing::debug;

/// Build the engine start configuration for an operation
pub fn to_start_configuration(parameters: &OperationParameters) -> StartConfiguration {
    let mut config = StartConfiguration::new(parameters.project_dir());

    if let Some(user_home) = parameters.user_home_dir() {
        config.user_home_dir = Some(user_home.to_path_buf());
    }
    config.search_upwards = parameters.search_upwards().unwrap_or(true);
    config.environment = parameters.environment().clone();

    config
}

/// Attach the client's sinks to an engine instance
///
/// The progress listener is registered on the logging scope; it stays
/// attached for as long as the returned registration lives.
pub fn attach_listeners(
    parameters: &OperationParameters,
    engine: &mut dyn BuildEngine,
    logging: &LoggingScope,
) -> Option<ListenerRegistration> {
    if let Some(sink) = parameters.standard_output() {
        engine.add_standard_output_listener(Box::new(StreamBackedListener::new(sink.clone())));
    }
    if let Some(sink) = parameters.standard_error() {
        engine.add_standard_error_listener(Box::new(StreamBackedListener::new(sink.clone())));
    }

    parameters.progress_listener().map(|listener| {
        debug!("Attaching progress listener to logging scope {}", logging.id());
        logging.add_output_event_listener(Arc::new(ProgressStartFilter::new(listener.clone())))
    })
}
