//! Shared fixtures for integration tests
//!
//! [`RecordingFactory`] hands out fake engines that follow a script of
//! outcomes and record everything the connection asks of them.

#![allow(dead_code)]

use build_connection::engine::{
    AnalyzedProject, BuildEngine, BuildEngineFactory, BuildListener, BuildResult, LoggingScope,
    OutputEvent, StandardOutputListener, StartConfiguration, TaskDescriptor,
};
use build_connection::error::Cause;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// What a fake engine does when run or analysed
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Report success
    Success,
    /// Report a build failure with this message
    Fail(String),
    /// Panic with this message
    Panic(String),
}

/// Blocks engines until released
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.changed.wait(open).unwrap();
        }
    }
}

/// Everything the fake engines observed
#[derive(Default)]
pub struct Recorder {
    pub configs: Mutex<Vec<StartConfiguration>>,
    pub runs: Mutex<Vec<Vec<String>>>,
    pub analyses: AtomicUsize,
    pub threads: Mutex<Vec<String>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl Recorder {
    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.load(Ordering::SeqCst)
    }

    pub fn engines_created(&self) -> usize {
        self.configs.lock().unwrap().len()
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let name = thread::current().name().unwrap_or_default().to_string();
        self.threads.lock().unwrap().push(name);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Factory producing scripted fake engines
pub struct RecordingFactory {
    pub recorder: Arc<Recorder>,
    script: Mutex<VecDeque<Outcome>>,
    project: AnalyzedProject,
    events: Vec<OutputEvent>,
    output: Option<String>,
    gate: Option<Arc<Gate>>,
    delay: Option<Duration>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            script: Mutex::new(VecDeque::new()),
            project: sample_project(),
            events: Vec::new(),
            output: None,
            gate: None,
            delay: None,
        }
    }

    /// Outcomes consumed one per engine; engines succeed once it runs out
    pub fn with_script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        *self.script.lock().unwrap() = outcomes.into_iter().collect();
        self
    }

    pub fn with_events(mut self, events: Vec<OutputEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }

    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl BuildEngineFactory for RecordingFactory {
    fn new_instance(
        &self,
        config: StartConfiguration,
        logging: &LoggingScope,
    ) -> Result<Box<dyn BuildEngine>, Cause> {
        self.recorder.configs.lock().unwrap().push(config.clone());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Success);

        Ok(Box::new(FakeEngine {
            config,
            logging: logging.clone(),
            outcome,
            recorder: self.recorder.clone(),
            project: self.project.clone(),
            events: self.events.clone(),
            output: self.output.clone(),
            gate: self.gate.clone(),
            delay: self.delay,
            stdout: Vec::new(),
            stderr: Vec::new(),
            build_listeners: Vec::new(),
        }))
    }
}

struct FakeEngine {
    config: StartConfiguration,
    logging: LoggingScope,
    outcome: Outcome,
    recorder: Arc<Recorder>,
    project: AnalyzedProject,
    events: Vec<OutputEvent>,
    output: Option<String>,
    gate: Option<Arc<Gate>>,
    delay: Option<Duration>,
    stdout: Vec<Box<dyn StandardOutputListener>>,
    stderr: Vec<Box<dyn StandardOutputListener>>,
    build_listeners: Vec<Arc<dyn BuildListener>>,
}

impl FakeEngine {
    fn work(&mut self) -> BuildResult {
        self.recorder.enter();
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        for event in &self.events {
            self.logging.emit(event.clone());
        }
        if let Some(output) = &self.output {
            for listener in &self.stdout {
                listener.on_output(output);
            }
        }
        self.recorder.exit();

        match &self.outcome {
            Outcome::Success => BuildResult::success(),
            Outcome::Fail(message) => {
                for listener in &self.stderr {
                    listener.on_output(message);
                }
                BuildResult::failed(message.clone())
            }
            Outcome::Panic(message) => panic!("{}", message),
        }
    }
}

impl BuildEngine for FakeEngine {
    fn add_standard_output_listener(&mut self, listener: Box<dyn StandardOutputListener>) {
        self.stdout.push(listener);
    }

    fn add_standard_error_listener(&mut self, listener: Box<dyn StandardOutputListener>) {
        self.stderr.push(listener);
    }

    fn add_build_listener(&mut self, listener: Arc<dyn BuildListener>) {
        self.build_listeners.push(listener);
    }

    fn run(&mut self) -> BuildResult {
        self.recorder
            .runs
            .lock()
            .unwrap()
            .push(self.config.task_names.clone());
        self.work()
    }

    fn build_analysis(&mut self) -> BuildResult {
        self.recorder.analyses.fetch_add(1, Ordering::SeqCst);
        let result = self.work();
        if result.is_success() {
            let mut root = self.project.clone();
            for listener in &self.build_listeners {
                listener.projects_evaluated(&mut root);
            }
        }
        result
    }
}

/// Two-project build used by model tests
pub fn sample_project() -> AnalyzedProject {
    let mut root = AnalyzedProject::new("shop", ":", "/proj");
    root.tasks.push(TaskDescriptor {
        name: "build".to_string(),
        description: Some("Assembles and tests this project.".to_string()),
    });

    let mut api = AnalyzedProject::new("api", ":api", "/proj/api");
    api.project_dependencies.push(":core".to_string());
    api.tasks.push(TaskDescriptor {
        name: "test".to_string(),
        description: None,
    });

    root.children.push(api);
    root.children.push(AnalyzedProject::new("core", ":core", "/proj/core"));
    root
}

/// In-memory sink usable as a shared writer
pub fn memory_sink() -> (Arc<Mutex<Vec<u8>>>, build_connection::protocol::SharedWriter) {
    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink: build_connection::protocol::SharedWriter = buffer.clone();
    (buffer, sink)
}
