//! Capability-tagged project models
//!
//! A client asks for a [`ModelKind`]; the worker answers with a
//! [`ProjectModel`] whose populated [`Capabilities`] must contain the
//! capabilities that kind requires. Narrower kinds add capabilities on top of
//! the base project capability.
//!
//! ```text
//! Project ─┬─ HierarchicalProject ── HierarchicalIdeProject ─┐
//!          └─ BuildableProject ─────────────────────────────── IdeProject
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

bitflags! {
    /// Information a project model exposes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u8 {
        /// Name, path, description and directory
        const PROJECT              = 0b0000_0001;
        /// Child projects
        const HIERARCHY            = 0b0000_0010;
        /// Tasks that can be selected for a build
        const TASKS                = 0b0000_0100;
        /// Dependencies on other projects and source directories
        const PROJECT_DEPENDENCIES = 0b0000_1000;
        /// Resolved external dependencies
        const EXTERNAL_DEPENDENCIES = 0b0001_0000;
    }
}

/// Model types a client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Base project model
    Project,
    /// Project model with child projects
    HierarchicalProject,
    /// Project model with tasks
    BuildableProject,
    /// Hierarchy plus project dependencies and source directories
    HierarchicalIdeProject,
    /// Full IDE integration model
    IdeProject,
}

impl ModelKind {
    /// Every kind this side of the protocol knows about
    pub const ALL: [ModelKind; 5] = [
        ModelKind::Project,
        ModelKind::HierarchicalProject,
        ModelKind::BuildableProject,
        ModelKind::HierarchicalIdeProject,
        ModelKind::IdeProject,
    ];

    /// Wire tag for this kind
    pub fn tag(self) -> &'static str {
        match self {
            ModelKind::Project => "project",
            ModelKind::HierarchicalProject => "hierarchical-project",
            ModelKind::BuildableProject => "buildable-project",
            ModelKind::HierarchicalIdeProject => "hierarchical-ide-project",
            ModelKind::IdeProject => "ide-project",
        }
    }

    /// Capabilities a model must expose to satisfy this kind
    pub fn required_capabilities(self) -> Capabilities {
        match self {
            ModelKind::Project => Capabilities::PROJECT,
            ModelKind::HierarchicalProject => Capabilities::PROJECT | Capabilities::HIERARCHY,
            ModelKind::BuildableProject => Capabilities::PROJECT | Capabilities::TASKS,
            ModelKind::HierarchicalIdeProject => {
                Capabilities::PROJECT | Capabilities::HIERARCHY | Capabilities::PROJECT_DEPENDENCIES
            }
            ModelKind::IdeProject => Capabilities::all(),
        }
    }

    /// Check whether a model exposing `capabilities` satisfies this kind
    pub fn is_satisfied_by(self, capabilities: Capabilities) -> bool {
        capabilities.contains(self.required_capabilities())
    }

    /// Check whether `other` can be handed out wherever this kind is requested
    pub fn is_assignable_from(self, other: ModelKind) -> bool {
        self.is_satisfied_by(other.required_capabilities())
    }

    /// Whether building this kind needs task information
    pub fn requires_tasks(self) -> bool {
        self.required_capabilities().contains(Capabilities::TASKS)
    }

    /// Whether this kind can be built from project dependencies alone
    pub fn requires_only_project_dependencies(self) -> bool {
        !self
            .required_capabilities()
            .contains(Capabilities::EXTERNAL_DEPENDENCIES)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Error returned when a tag names no known model kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model type: {0}")]
pub struct UnknownModelKind(pub String);

impl FromStr for ModelKind {
    type Err = UnknownModelKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| UnknownModelKind(s.to_string()))
    }
}

/// A task that can be selected for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskModel {
    /// Fully qualified task path (e.g., ":app:build")
    pub path: String,
    /// Task name
    pub name: String,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Dependency on another project of the same build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDependency {
    /// Path of the target project
    pub path: String,
}

/// Dependency resolved from outside the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDependency {
    /// Module notation (e.g., "org.example:lib:1.0")
    pub notation: String,
    /// Resolved artifact location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Project model handed back to the client
///
/// Capability-gated accessors return `None` when the corresponding
/// information was not built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectModel {
    capabilities: Capabilities,
    name: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    project_dir: PathBuf,
    #[serde(default)]
    children: Vec<ProjectModel>,
    #[serde(default)]
    tasks: Vec<TaskModel>,
    #[serde(default)]
    project_dependencies: Vec<ProjectDependency>,
    #[serde(default)]
    source_directories: Vec<PathBuf>,
    #[serde(default)]
    external_dependencies: Vec<ExternalDependency>,
}

impl ProjectModel {
    /// Create a base project model
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        project_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            capabilities: Capabilities::PROJECT,
            name: name.into(),
            path: path.into(),
            description: None,
            project_dir: project_dir.into(),
            children: Vec::new(),
            tasks: Vec::new(),
            project_dependencies: Vec::new(),
            source_directories: Vec::new(),
            external_dependencies: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Populate child projects
    pub fn with_children(mut self, children: Vec<ProjectModel>) -> Self {
        self.children = children;
        self.capabilities |= Capabilities::HIERARCHY;
        self
    }

    /// Populate tasks
    pub fn with_tasks(mut self, tasks: Vec<TaskModel>) -> Self {
        self.tasks = tasks;
        self.capabilities |= Capabilities::TASKS;
        self
    }

    /// Populate project dependencies and source directories
    pub fn with_project_dependencies(
        mut self,
        dependencies: Vec<ProjectDependency>,
        source_directories: Vec<PathBuf>,
    ) -> Self {
        self.project_dependencies = dependencies;
        self.source_directories = source_directories;
        self.capabilities |= Capabilities::PROJECT_DEPENDENCIES;
        self
    }

    /// Populate external dependencies
    pub fn with_external_dependencies(mut self, dependencies: Vec<ExternalDependency>) -> Self {
        self.external_dependencies = dependencies;
        self.capabilities |= Capabilities::EXTERNAL_DEPENDENCIES;
        self
    }

    /// Capabilities this model populates
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Check whether this model can be handed out for `kind`
    pub fn satisfies(&self, kind: ModelKind) -> bool {
        kind.is_satisfied_by(self.capabilities)
    }

    /// Project name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project path (e.g., ":" or ":app")
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Project description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Project directory
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Child projects
    pub fn children(&self) -> Option<&[ProjectModel]> {
        self.gated(Capabilities::HIERARCHY, &self.children)
    }

    /// Tasks
    pub fn tasks(&self) -> Option<&[TaskModel]> {
        self.gated(Capabilities::TASKS, &self.tasks)
    }

    /// Project dependencies
    pub fn project_dependencies(&self) -> Option<&[ProjectDependency]> {
        self.gated(Capabilities::PROJECT_DEPENDENCIES, &self.project_dependencies)
    }

    /// Source directories
    pub fn source_directories(&self) -> Option<&[PathBuf]> {
        self.gated(Capabilities::PROJECT_DEPENDENCIES, &self.source_directories)
    }

    /// External dependencies
    pub fn external_dependencies(&self) -> Option<&[ExternalDependency]> {
        self.gated(Capabilities::EXTERNAL_DEPENDENCIES, &self.external_dependencies)
    }

    /// Find a project in this tree by path
    pub fn find_project(&self, path: &str) -> Option<&ProjectModel> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_project(path))
    }

    fn gated<'a, T>(&self, capability: Capabilities, items: &'a [T]) -> Option<&'a [T]> {
        self.capabilities.contains(capability).then_some(items)
    }
}
