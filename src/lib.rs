//! build-connection: embeddable, versioned connection to a build engine
//!
//! This library lets a client (an IDE, a script, another process) request a
//! project model or execute a build without blocking its own thread and
//! without knowing which engine release it talks to.
//!
//! # Architecture
//!
//! A [`DefaultConnection`] implements the append-only [`BuildConnection`]
//! trait. On first use it spawns a single worker thread; every request is
//! queued on that worker and served one at a time, in submission order.
//! Each accepted request ends with exactly one call to its
//! [`ResultHandler`]: `on_complete` or `on_failure`.
//!
//! # Modules
//!
//! - `protocol`: Versioned protocol surface (operations, parameters, models, handlers)
//! - `connection`: Client-facing connection and its lifecycle
//! - `worker`: Serialized worker and model building pipeline
//! - `translate`: Operation parameter translation
//! - `engine`: Build engine collaborator contract and output events
//! - `config`: Configuration parsing and validation
//! - `monitoring`: Request counters
//! - `logging`: Subscriber setup
//! - `error`: Error types and handling
//!
//! # Example
//!
//! ```no_run
//! use build_connection::{channel_handler, BuildConnection, BuildEngineFactory};
//! use build_connection::{BuildParameters, DefaultConnection, OperationParameters};
//! use std::sync::Arc;
//!
//! fn build(factory: Arc<dyn BuildEngineFactory>) -> build_connection::Result<()> {
//!     let connection = DefaultConnection::new(factory);
//!     let (handler, outcome) = channel_handler::<()>();
//!     connection.execute_build(
//!         BuildParameters::new(["build"]),
//!         OperationParameters::new("/proj"),
//!         handler,
//!     )?;
//!     let result = outcome.blocking_recv();
//!     connection.stop();
//!     println!("build finished: {:?}", result.map(|r| r.is_ok()));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitoring;
pub mod protocol;
pub mod translate;
pub mod worker;

// Re-export commonly used types
pub use config::{ConnectionConfig, QueuePolicy};
pub use connection::{ConnectionBuilder, ConnectionState, DefaultConnection};
pub use engine::{BuildEngine, BuildEngineFactory, BuildResult, LoggingScope, StartConfiguration};
pub use error::{ConnectionError, Result};
pub use protocol::{
    channel_handler, handler_fn, BuildConnection, BuildParameters, Capabilities,
    ModelFetchParameters, ModelKind, OperationParameters, ProjectModel, ResultHandler,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
