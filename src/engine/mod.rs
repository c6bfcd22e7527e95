//! Build engine collaborator contract
//!
//! The engine is consumed as a black box: a factory hands out a fresh
//! instance per operation, and an instance either runs a build or produces a
//! build analysis, reporting success or a failure cause.

mod output;

pub use output::{
    ListenerRegistration, LogLevel, LoggingScope, OutputEvent, OutputEventListener,
    ProgressStartFilter, StandardOutputListener, StreamBackedListener,
};

use crate::error::Cause;
use crate::protocol::ExternalDependency;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration an engine instance is started with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartConfiguration {
    /// Base directory of the project
    pub project_dir: PathBuf,
    /// Working directory for the build
    pub current_dir: PathBuf,
    /// Search parent directories for the build definition
    pub search_upwards: bool,
    /// Engine user home directory
    pub user_home_dir: Option<PathBuf>,
    /// Environment overrides
    pub environment: BTreeMap<String, String>,
    /// Task selectors to execute
    pub task_names: Vec<String>,
}

impl StartConfiguration {
    /// Create a configuration for `project_dir` with default settings
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        Self {
            current_dir: project_dir.clone(),
            project_dir,
            search_upwards: true,
            user_home_dir: None,
            environment: BTreeMap::new(),
            task_names: Vec::new(),
        }
    }
}

/// Outcome of an engine run or analysis
#[derive(Default)]
pub struct BuildResult {
    failure: Option<Cause>,
}

impl BuildResult {
    /// A run that completed without failure
    pub fn success() -> Self {
        Self { failure: None }
    }

    /// A run that reported `cause`
    pub fn failed(cause: impl Into<Cause>) -> Self {
        Self {
            failure: Some(cause.into()),
        }
    }

    /// The reported failure, if any
    pub fn failure(&self) -> Option<&Cause> {
        self.failure.as_ref()
    }

    /// Check if the run succeeded
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Take the reported failure
    pub fn into_failure(self) -> Option<Cause> {
        self.failure
    }
}

impl fmt::Debug for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(f, "BuildResult(success)"),
            Some(cause) => write!(f, "BuildResult(failed: {})", cause),
        }
    }
}

/// Task as seen by the engine's analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Task name, unique within its project
    pub name: String,
    /// Optional description
    pub description: Option<String>,
}

/// Project structure produced by the engine's analysis phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedProject {
    /// Project name
    pub name: String,
    /// Project path (":" for the root)
    pub path: String,
    /// Optional description
    pub description: Option<String>,
    /// Project directory
    pub project_dir: PathBuf,
    /// Tasks declared by the project
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
    /// Paths of projects this project depends on
    #[serde(default)]
    pub project_dependencies: Vec<String>,
    /// Source directories
    #[serde(default)]
    pub source_directories: Vec<PathBuf>,
    /// External dependencies
    #[serde(default)]
    pub external_dependencies: Vec<ExternalDependency>,
    /// Child projects
    #[serde(default)]
    pub children: Vec<AnalyzedProject>,
}

impl AnalyzedProject {
    /// Create a project without tasks, dependencies or children
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: None,
            project_dir: project_dir.into(),
            tasks: Vec::new(),
            project_dependencies: Vec::new(),
            source_directories: Vec::new(),
            external_dependencies: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Path of a task of this project
    pub fn task_path(&self, task: &str) -> String {
        if self.path == ":" {
            format!(":{}", task)
        } else {
            format!("{}:{}", self.path, task)
        }
    }

    /// Visit this project and all descendants, parents first
    pub fn visit_mut(&mut self, visitor: &mut dyn FnMut(&mut AnalyzedProject)) {
        visitor(self);
        for child in &mut self.children {
            child.visit_mut(visitor);
        }
    }
}

/// Notified by the engine at build lifecycle points
pub trait BuildListener: Send + Sync {
    /// All projects have been evaluated; `root` may be adjusted in place
    fn projects_evaluated(&self, root: &mut AnalyzedProject);
}

/// A single engine instance, used for exactly one operation
pub trait BuildEngine: Send {
    /// Register a listener for the build's standard output
    fn add_standard_output_listener(&mut self, listener: Box<dyn StandardOutputListener>);

    /// Register a listener for the build's standard error
    fn add_standard_error_listener(&mut self, listener: Box<dyn StandardOutputListener>);

    /// Register a build lifecycle listener
    fn add_build_listener(&mut self, listener: Arc<dyn BuildListener>);

    /// Execute the configured tasks
    fn run(&mut self) -> BuildResult;

    /// Evaluate the build without necessarily executing tasks
    fn build_analysis(&mut self) -> BuildResult;
}

/// Creates engine instances
pub trait BuildEngineFactory: Send + Sync {
    /// Create a fresh engine instance bound to `logging`
    fn new_instance(
        &self,
        config: StartConfiguration,
        logging: &LoggingScope,
    ) -> std::result::Result<Box<dyn BuildEngine>, Cause>;
}
