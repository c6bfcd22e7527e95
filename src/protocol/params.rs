//! Parameter objects passed across the connection
//!
//! Every value here is constructed by the client for a single call and never
//! mutated afterwards. Sinks are skipped by serde; everything else can be
//! carried by a serialized transport.

use crate::error::{ConnectionError, Result};
use crate::protocol::ModelKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Writer shared between the client and the worker thread
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Receives human-readable status changes while an operation runs
pub trait ProgressListener: Send + Sync {
    /// Called when the engine starts a new unit of work
    fn status_changed(&self, description: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn status_changed(&self, description: &str) {
        self(description)
    }
}

/// Parameters common to every long-running operation
#[derive(Clone, Serialize, Deserialize)]
pub struct OperationParameters {
    /// Root directory of the project to operate on
    project_dir: PathBuf,

    /// Environment overrides applied to the engine
    #[serde(default)]
    environment: BTreeMap<String, String>,

    /// Engine user home directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_home_dir: Option<PathBuf>,

    /// Search parent directories for the build definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    search_upwards: Option<bool>,

    #[serde(skip)]
    standard_output: Option<SharedWriter>,

    #[serde(skip)]
    standard_error: Option<SharedWriter>,

    #[serde(skip)]
    progress_listener: Option<Arc<dyn ProgressListener>>,
}

impl OperationParameters {
    /// Create parameters for the project rooted at `project_dir`
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            environment: BTreeMap::new(),
            user_home_dir: None,
            search_upwards: None,
            standard_output: None,
            standard_error: None,
            progress_listener: None,
        }
    }

    /// Add an environment override
    pub fn with_environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the engine user home directory
    pub fn with_user_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_home_dir = Some(dir.into());
        self
    }

    /// Control whether the engine searches parent directories
    pub fn with_search_upwards(mut self, search_upwards: bool) -> Self {
        self.search_upwards = Some(search_upwards);
        self
    }

    /// Attach a sink for the engine's standard output
    pub fn with_standard_output(mut self, sink: SharedWriter) -> Self {
        self.standard_output = Some(sink);
        self
    }

    /// Attach a sink for the engine's standard error
    pub fn with_standard_error(mut self, sink: SharedWriter) -> Self {
        self.standard_error = Some(sink);
        self
    }

    /// Attach a progress listener
    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress_listener = Some(listener);
        self
    }

    /// Project root directory
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Environment overrides
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Engine user home directory, if set
    pub fn user_home_dir(&self) -> Option<&Path> {
        self.user_home_dir.as_deref()
    }

    /// Search-upwards flag, if set
    pub fn search_upwards(&self) -> Option<bool> {
        self.search_upwards
    }

    /// Standard output sink, if set
    pub fn standard_output(&self) -> Option<&SharedWriter> {
        self.standard_output.as_ref()
    }

    /// Standard error sink, if set
    pub fn standard_error(&self) -> Option<&SharedWriter> {
        self.standard_error.as_ref()
    }

    /// Progress listener, if set
    pub fn progress_listener(&self) -> Option<&Arc<dyn ProgressListener>> {
        self.progress_listener.as_ref()
    }
}

impl fmt::Debug for OperationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationParameters")
            .field("project_dir", &self.project_dir)
            .field("environment", &self.environment)
            .field("user_home_dir", &self.user_home_dir)
            .field("search_upwards", &self.search_upwards)
            .field("standard_output", &self.standard_output.is_some())
            .field("standard_error", &self.standard_error.is_some())
            .field("progress_listener", &self.progress_listener.is_some())
            .finish()
    }
}

/// Parameters for a build execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Task selectors, in execution request order
    tasks: Vec<String>,
}

impl BuildParameters {
    /// Create build parameters from an ordered list of task selectors
    pub fn new<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    /// Task selectors
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }
}

/// Parameters for a model fetch
///
/// The model type travels as its tag so that a client built against a newer
/// protocol can name a type this side does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFetchParameters {
    /// Tag of the requested model type
    model_type: String,
}

impl ModelFetchParameters {
    /// Request a model by tag
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
        }
    }

    /// Request a known model kind
    pub fn for_kind(kind: ModelKind) -> Self {
        Self::new(kind.tag())
    }

    /// Tag of the requested model type
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    /// Resolve the tag against the kinds this side knows how to answer
    pub fn kind(&self) -> Result<ModelKind> {
        self.model_type.parse::<ModelKind>().map_err(|_| {
            ConnectionError::UnsupportedOperation(format!(
                "Cannot build model of type '{}'.",
                self.model_type
            ))
        })
    }
}
