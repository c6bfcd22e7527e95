//! Integration tests for the connection lifecycle and request contract

mod common;

use build_connection::engine::{AnalyzedProject, OutputEvent};
use build_connection::error::Cause;
use build_connection::protocol::ProgressListener;
use build_connection::worker::{ModelOptions, ModelTransform};
use build_connection::{
    channel_handler, handler_fn, BuildConnection, BuildParameters, ConnectionConfig,
    ConnectionError, ConnectionState, DefaultConnection, ModelFetchParameters, ModelKind,
    Capabilities, OperationParameters, ProjectModel, QueuePolicy,
};
use common::{memory_sink, Gate, Outcome, RecordingFactory};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn joining_config() -> ConnectionConfig {
    ConnectionConfig {
        join_on_stop: true,
        ..ConnectionConfig::default()
    }
}

fn connect(factory: Arc<RecordingFactory>) -> DefaultConnection {
    DefaultConnection::builder(factory)
        .config(joining_config())
        .build()
        .unwrap()
}

#[derive(Default)]
struct Callbacks {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

fn counting_handler<T: Send + 'static>(
    callbacks: &Arc<Callbacks>,
) -> Box<dyn build_connection::ResultHandler<T>> {
    let on_complete = callbacks.clone();
    let on_failure = callbacks.clone();
    handler_fn(
        move |_| {
            on_complete.completed.fetch_add(1, Ordering::SeqCst);
        },
        move |_| {
            on_failure.failed.fetch_add(1, Ordering::SeqCst);
        },
    )
}

#[test]
fn test_build_on_unstarted_connection() {
    let factory = Arc::new(RecordingFactory::new());
    let connection = connect(factory.clone());
    assert_eq!(connection.state(), ConnectionState::Unstarted);

    let callbacks = Arc::new(Callbacks::default());
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            counting_handler(&callbacks),
        )
        .unwrap();
    connection.stop();

    assert_eq!(callbacks.completed.load(Ordering::SeqCst), 1);
    assert_eq!(callbacks.failed.load(Ordering::SeqCst), 0);
    assert_eq!(factory.recorder.run_count(), 1);
    assert_eq!(
        *factory.recorder.runs.lock().unwrap(),
        vec![vec!["build".to_string()]]
    );

    let configs = factory.recorder.configs.lock().unwrap();
    assert_eq!(configs[0].project_dir, PathBuf::from("/proj"));
}

#[test]
fn test_requests_after_stop_fail_synchronously() {
    let gate = Arc::new(Gate::default());
    let factory = Arc::new(RecordingFactory::new().with_gate(gate.clone()));
    let connection = DefaultConnection::new(factory.clone());

    let (first, first_rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            first,
        )
        .unwrap();

    connection.stop();
    assert_eq!(connection.state(), ConnectionState::Stopped);

    let callbacks = Arc::new(Callbacks::default());
    let err = connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            counting_handler(&callbacks),
        )
        .unwrap_err();
    assert!(err.is_illegal_state());

    let err = connection
        .get_model(
            ModelFetchParameters::for_kind(ModelKind::Project),
            OperationParameters::new("/proj"),
            counting_handler(&callbacks),
        )
        .unwrap_err();
    assert!(err.is_illegal_state());

    // The in-flight build was not cancelled
    gate.release();
    assert!(first_rx.blocking_recv().unwrap().is_ok());
    assert_eq!(callbacks.completed.load(Ordering::SeqCst), 0);
    assert_eq!(callbacks.failed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_version_and_display_name_survive_stop() {
    let connection = connect(Arc::new(RecordingFactory::new()));
    let version = connection.get_version();
    let name = connection.get_display_name();

    connection.stop();
    connection.stop();

    assert_eq!(connection.get_version(), version);
    assert_eq!(connection.get_display_name(), name);
    assert_eq!(version, build_connection::VERSION);
}

#[test]
fn test_unknown_model_type_rejected_without_engine() {
    let factory = Arc::new(RecordingFactory::new());
    let connection = connect(factory.clone());

    let callbacks = Arc::new(Callbacks::default());
    let err = connection
        .get_model(
            ModelFetchParameters::new("workspace-model-v9"),
            OperationParameters::new("/proj"),
            counting_handler(&callbacks),
        )
        .unwrap_err();

    assert!(err.is_unsupported());
    assert!(err.to_string().contains("workspace-model-v9"));
    assert_eq!(connection.state(), ConnectionState::Unstarted);
    connection.stop();

    assert_eq!(factory.recorder.engines_created(), 0);
    assert_eq!(callbacks.completed.load(Ordering::SeqCst), 0);
    assert_eq!(callbacks.failed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_build_failure_preserves_cause() {
    let factory = Arc::new(
        RecordingFactory::new().with_script([Outcome::Fail("compilation failed".to_string())]),
    );
    let connection = connect(factory);

    let (handler, rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["compile"]),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    let err = rx.blocking_recv().unwrap().unwrap_err();
    match &err {
        ConnectionError::BuildExecution { source } => {
            assert_eq!(source.to_string(), "compilation failed")
        }
        other => panic!("unexpected error: {other}"),
    }
    connection.stop();
}

#[test]
fn test_worker_survives_panicking_engine() {
    let factory = Arc::new(RecordingFactory::new().with_script([
        Outcome::Panic("engine state corrupted".to_string()),
        Outcome::Success,
    ]));
    let connection = connect(factory.clone());

    let (first, first_rx) = channel_handler::<()>();
    let (second, second_rx) = channel_handler::<()>();
    for handler in [first, second] {
        connection
            .execute_build(
                BuildParameters::new(["build"]),
                OperationParameters::new("/proj"),
                handler,
            )
            .unwrap();
    }

    let err = first_rx.blocking_recv().unwrap().unwrap_err();
    assert!(matches!(err, ConnectionError::Unexpected(ref m) if m == "engine state corrupted"));
    assert!(second_rx.blocking_recv().unwrap().is_ok());

    connection.stop();
    let stats = connection.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.engines_created, 2);
}

#[test]
fn test_buildable_project_has_tasks() {
    let factory = Arc::new(RecordingFactory::new());
    let connection = connect(factory.clone());

    let (handler, rx) = channel_handler::<ProjectModel>();
    connection
        .get_model(
            ModelFetchParameters::for_kind(ModelKind::BuildableProject),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    let model = rx.blocking_recv().unwrap().unwrap();
    assert!(model.satisfies(ModelKind::BuildableProject));
    let tasks = model.tasks().unwrap();
    assert_eq!(tasks[0].path, ":build");
    assert_eq!(model.find_project(":api").unwrap().tasks().unwrap()[0].path, ":api:test");

    connection.stop();
    assert_eq!(factory.recorder.analysis_count(), 1);
    assert_eq!(factory.recorder.run_count(), 0);
}

#[test]
fn test_project_model_without_tasks() {
    let connection = connect(Arc::new(RecordingFactory::new()));

    let (handler, rx) = channel_handler::<ProjectModel>();
    connection
        .get_model(
            ModelFetchParameters::new("project"),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    let model = rx.blocking_recv().unwrap().unwrap();
    assert!(model.satisfies(ModelKind::Project));
    assert!(model.tasks().is_none());
    assert_eq!(model.name(), "shop");
    connection.stop();
}

#[test]
fn test_failed_analysis_is_build_failure() {
    let factory = Arc::new(
        RecordingFactory::new().with_script([Outcome::Fail("settings file broken".to_string())]),
    );
    let connection = connect(factory);

    let (handler, rx) = channel_handler::<ProjectModel>();
    connection
        .get_model(
            ModelFetchParameters::for_kind(ModelKind::IdeProject),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    assert!(rx.blocking_recv().unwrap().unwrap_err().is_build_failure());
    connection.stop();
}

#[test]
fn test_requests_run_in_submission_order() {
    let factory = Arc::new(RecordingFactory::new().with_delay(Duration::from_millis(5)));
    let connection = Arc::new(connect(factory.clone()));
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let completed = order.clone();
        let failed = order.clone();
        connection
            .execute_build(
                BuildParameters::new([format!("task{i}")]),
                OperationParameters::new("/proj"),
                handler_fn(
                    move |_| completed.lock().unwrap().push(i),
                    move |_| failed.lock().unwrap().push(100 + i),
                ),
            )
            .unwrap();
    }
    connection.stop();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    let runs = factory.recorder.runs.lock().unwrap();
    let tasks: Vec<_> = runs.iter().map(|tasks| tasks[0].clone()).collect();
    assert_eq!(tasks, vec!["task0", "task1", "task2", "task3", "task4"]);
    assert_eq!(factory.recorder.max_active.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_callers_never_overlap() {
    let factory = Arc::new(RecordingFactory::new().with_delay(Duration::from_millis(2)));
    let connection = Arc::new(connect(factory.clone()));
    let callbacks = Arc::new(Callbacks::default());

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let connection = connection.clone();
            let callbacks = callbacks.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    connection
                        .execute_build(
                            BuildParameters::new(["build"]),
                            OperationParameters::new("/proj"),
                            counting_handler(&callbacks),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }
    connection.stop();

    assert_eq!(callbacks.completed.load(Ordering::SeqCst), 20);
    assert_eq!(factory.recorder.max_active.load(Ordering::SeqCst), 1);
    let threads = factory.recorder.threads.lock().unwrap();
    assert!(threads.iter().all(|name| name == "build-connection-worker"));
}

#[test]
fn test_reject_when_busy_policy() {
    let gate = Arc::new(Gate::default());
    let factory = Arc::new(RecordingFactory::new().with_gate(gate.clone()));
    let config = ConnectionConfig {
        queue_policy: QueuePolicy::RejectWhenBusy,
        ..joining_config()
    };
    let connection = DefaultConnection::builder(factory.clone())
        .config(config)
        .build()
        .unwrap();

    let (first, first_rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            first,
        )
        .unwrap();

    let (second, _second_rx) = channel_handler::<()>();
    let err = connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            second,
        )
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Busy(_)));

    gate.release();
    assert!(first_rx.blocking_recv().unwrap().is_ok());

    // Slot is freed before the callback fires
    let (third, third_rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            third,
        )
        .unwrap();
    assert!(third_rx.blocking_recv().unwrap().is_ok());

    connection.stop();
    assert_eq!(factory.recorder.run_count(), 2);
}

#[test]
fn test_sinks_and_progress_forwarding() {
    let factory = Arc::new(
        RecordingFactory::new()
            .with_output("BUILD SUCCESSFUL\n")
            .with_events(vec![
                OutputEvent::ProgressStart {
                    category: "build".to_string(),
                    description: "Configuring projects".to_string(),
                },
                OutputEvent::Log {
                    category: "build".to_string(),
                    level: build_connection::engine::LogLevel::Info,
                    message: "ignored".to_string(),
                },
                OutputEvent::ProgressComplete {
                    category: "build".to_string(),
                    status: "done".to_string(),
                },
            ]),
    );
    let connection = connect(factory);

    let (stdout, sink) = memory_sink();
    let progress = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen = progress.clone();
    let listener: Arc<dyn ProgressListener> =
        Arc::new(move |description: &str| seen.lock().unwrap().push(description.to_string()));

    let (handler, rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj")
                .with_standard_output(sink)
                .with_progress_listener(listener),
            handler,
        )
        .unwrap();
    assert!(rx.blocking_recv().unwrap().is_ok());

    // A later build without a listener must not reach the old one
    let (handler, rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();
    assert!(rx.blocking_recv().unwrap().is_ok());
    connection.stop();

    assert_eq!(String::from_utf8(stdout.lock().unwrap().clone()).unwrap(), "BUILD SUCCESSFUL\n");
    assert_eq!(*progress.lock().unwrap(), vec!["Configuring projects".to_string()]);
}

#[test]
fn test_parameters_reach_start_configuration() {
    let factory = Arc::new(RecordingFactory::new());
    let connection = connect(factory.clone());

    let (handler, rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["assemble"]),
            OperationParameters::new("/work/shop")
                .with_user_home_dir("/home/ci/.engine")
                .with_search_upwards(false)
                .with_environment("CI", "true"),
            handler,
        )
        .unwrap();
    assert!(rx.blocking_recv().unwrap().is_ok());
    connection.stop();

    let configs = factory.recorder.configs.lock().unwrap();
    let config = &configs[0];
    assert_eq!(config.project_dir, PathBuf::from("/work/shop"));
    assert_eq!(config.user_home_dir, Some(PathBuf::from("/home/ci/.engine")));
    assert!(!config.search_upwards);
    assert_eq!(config.environment.get("CI").map(String::as_str), Some("true"));
    assert_eq!(config.task_names, vec!["assemble".to_string()]);
}

#[test]
fn test_stop_from_callback() {
    let factory = Arc::new(RecordingFactory::new());
    let connection = Arc::new(connect(factory));

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let inner = connection.clone();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            handler_fn(
                move |_| {
                    inner.stop();
                    done_tx.send(inner.state()).unwrap();
                },
                |_| {},
            ),
        )
        .unwrap();

    assert_eq!(done_rx.recv().unwrap(), ConnectionState::Stopped);
    assert_eq!(connection.state(), ConnectionState::Stopped);
}

/// Transform that claims every capability but only ever builds the base model
struct BaseOnlyTransform;

impl ModelTransform for BaseOnlyTransform {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn transform(
        &self,
        root: &AnalyzedProject,
        _options: ModelOptions,
    ) -> Result<ProjectModel, Cause> {
        Ok(ProjectModel::new(&root.name, &root.path, &root.project_dir))
    }
}

#[test]
fn test_model_missing_capabilities_is_unsupported() {
    let factory = Arc::new(RecordingFactory::new());
    let connection = DefaultConnection::builder(factory.clone())
        .config(joining_config())
        .model_transform(Arc::new(BaseOnlyTransform))
        .build()
        .unwrap();

    let (handler, rx) = channel_handler::<ProjectModel>();
    connection
        .get_model(
            ModelFetchParameters::for_kind(ModelKind::BuildableProject),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    let err = rx.blocking_recv().unwrap().unwrap_err();
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("buildable-project"));
    assert_eq!(factory.recorder.analysis_count(), 1);

    // The worker keeps serving after the rejected model
    let (handler, rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();
    assert!(rx.blocking_recv().unwrap().is_ok());

    connection.stop();
    let stats = connection.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
}

#[test]
fn test_environment_preparer_edits_model() {
    let preparer = |root: &mut AnalyzedProject| -> Result<(), Cause> {
        root.visit_mut(&mut |project: &mut AnalyzedProject| {
            let generated = project.project_dir.join("build/generated");
            project.source_directories.push(generated);
        });
        Ok(())
    };
    let connection = DefaultConnection::builder(Arc::new(RecordingFactory::new()))
        .config(joining_config())
        .environment_preparer(Arc::new(preparer))
        .build()
        .unwrap();

    let (handler, rx) = channel_handler::<ProjectModel>();
    connection
        .get_model(
            ModelFetchParameters::for_kind(ModelKind::HierarchicalIdeProject),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    let model = rx.blocking_recv().unwrap().unwrap();
    assert_eq!(
        model.source_directories().unwrap(),
        [PathBuf::from("/proj/build/generated")]
    );
    let core = model.find_project(":core").unwrap();
    assert_eq!(
        core.source_directories().unwrap(),
        [PathBuf::from("/proj/core/build/generated")]
    );
    connection.stop();
}

#[test]
fn test_default_stop_does_not_wait_for_queued_requests() {
    let gate = Arc::new(Gate::default());
    let factory = Arc::new(RecordingFactory::new().with_gate(gate.clone()));
    let connection = DefaultConnection::new(factory.clone());
    assert!(!connection.config().join_on_stop);

    let (handler, mut rx) = channel_handler::<()>();
    connection
        .execute_build(
            BuildParameters::new(["build"]),
            OperationParameters::new("/proj"),
            handler,
        )
        .unwrap();

    // Returns while the build is still blocked on the gate
    connection.stop();
    assert!(rx.try_recv().is_err());

    gate.release();
    assert!(rx.blocking_recv().unwrap().is_ok());
    assert_eq!(factory.recorder.run_count(), 1);
}
