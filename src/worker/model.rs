//! Model building pipeline
//!
//! During a build analysis the engine notifies a [`ModelBuildingListener`]
//! once all projects are evaluated. The listener runs the environment
//! preparation step and then the model transform, and keeps the outcome
//! until the worker collects it.

use crate::engine::{AnalyzedProject, BuildListener};
use crate::error::{Cause, ConnectionError, Result};
use crate::protocol::{Capabilities, ModelKind, ProjectDependency, ProjectModel, TaskModel};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// How much of the model a transform has to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOptions {
    /// Populate task information
    pub include_tasks: bool,
    /// Only project-to-project dependencies, skipping external resolution
    pub project_dependencies_only: bool,
}

impl ModelOptions {
    /// Options needed to satisfy `kind`
    pub fn for_kind(kind: ModelKind) -> Self {
        Self {
            include_tasks: kind.requires_tasks(),
            project_dependencies_only: kind.requires_only_project_dependencies(),
        }
    }
}

/// Prepares the analyzed project before the model is built
pub trait EnvironmentPreparer: Send + Sync {
    /// Adjust the analyzed project tree in place
    fn prepare(&self, root: &mut AnalyzedProject) -> std::result::Result<(), Cause>;
}

impl<F> EnvironmentPreparer for F
where
    F: Fn(&mut AnalyzedProject) -> std::result::Result<(), Cause> + Send + Sync,
{
    fn prepare(&self, root: &mut AnalyzedProject) -> std::result::Result<(), Cause> {
        self(root)
    }
}

/// Preparer that leaves the project untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreparer;

impl EnvironmentPreparer for NoopPreparer {
    fn prepare(&self, _root: &mut AnalyzedProject) -> std::result::Result<(), Cause> {
        Ok(())
    }
}

/// Turns an analyzed project into a versioned model
pub trait ModelTransform: Send + Sync {
    /// Every capability this transform is able to populate
    fn capabilities(&self) -> Capabilities;

    /// Build the model for `root`
    fn transform(
        &self,
        root: &AnalyzedProject,
        options: ModelOptions,
    ) -> std::result::Result<ProjectModel, Cause>;
}

/// Transform populating every capability the options ask for
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModelBuilder;

impl DefaultModelBuilder {
    fn build_project(project: &AnalyzedProject, options: ModelOptions) -> ProjectModel {
        let children = project
            .children
            .iter()
            .map(|child| Self::build_project(child, options))
            .collect();

        let dependencies = project
            .project_dependencies
            .iter()
            .map(|path| ProjectDependency { path: path.clone() })
            .collect();

        let mut model = ProjectModel::new(&project.name, &project.path, &project.project_dir)
            .with_description(project.description.clone())
            .with_children(children)
            .with_project_dependencies(dependencies, project.source_directories.clone());

        if options.include_tasks {
            let tasks = project
                .tasks
                .iter()
                .map(|task| TaskModel {
                    path: project.task_path(&task.name),
                    name: task.name.clone(),
                    description: task.description.clone(),
                })
                .collect();
            model = model.with_tasks(tasks);
        }

        if !options.project_dependencies_only {
            model = model.with_external_dependencies(project.external_dependencies.clone());
        }

        model
    }
}

impl ModelTransform for DefaultModelBuilder {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn transform(
        &self,
        root: &AnalyzedProject,
        options: ModelOptions,
    ) -> std::result::Result<ProjectModel, Cause> {
        Ok(Self::build_project(root, options))
    }
}

/// Pluggable parts of model construction, shared by every request
#[derive(Clone)]
pub struct ModelPipeline {
    pub(crate) preparer: Arc<dyn EnvironmentPreparer>,
    pub(crate) transform: Arc<dyn ModelTransform>,
}

impl ModelPipeline {
    /// Combine a preparer and a transform
    pub fn new(preparer: Arc<dyn EnvironmentPreparer>, transform: Arc<dyn ModelTransform>) -> Self {
        Self {
            preparer,
            transform,
        }
    }

    /// Check whether the transform can ever produce `kind`
    pub fn supports(&self, kind: ModelKind) -> bool {
        kind.is_satisfied_by(self.transform.capabilities())
    }
}

impl Default for ModelPipeline {
    fn default() -> Self {
        Self::new(Arc::new(NoopPreparer), Arc::new(DefaultModelBuilder))
    }
}

/// Build listener that captures the model produced during analysis
pub(crate) struct ModelBuildingListener {
    pipeline: ModelPipeline,
    options: ModelOptions,
    outcome: Mutex<Option<std::result::Result<ProjectModel, Cause>>>,
}

impl ModelBuildingListener {
    pub(crate) fn new(pipeline: ModelPipeline, options: ModelOptions) -> Self {
        Self {
            pipeline,
            options,
            outcome: Mutex::new(None),
        }
    }

    /// Collect the model once analysis has finished
    pub(crate) fn take_model(&self) -> Result<ProjectModel> {
        let outcome = self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match outcome {
            Some(Ok(model)) => Ok(model),
            Some(Err(cause)) => Err(ConnectionError::build_failure(cause)),
            None => Err(ConnectionError::Unexpected(
                "Build analysis finished without evaluating any project".to_string(),
            )),
        }
    }
}

impl BuildListener for ModelBuildingListener {
    fn projects_evaluated(&self, root: &mut AnalyzedProject) {
        debug!(
            "Building model for project '{}' ({:?})",
            root.name, self.options
        );

        let outcome = self
            .pipeline
            .preparer
            .prepare(root)
            .and_then(|_| self.pipeline.transform.transform(root, self.options));

        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}
