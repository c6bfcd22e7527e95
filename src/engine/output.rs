//! Output events and the per-connection logging scope
//!
//! The engine pushes typed [`OutputEvent`]s into a [`LoggingScope`]; the
//! scope fans them out to registered listeners. Client progress listeners are
//! attached through [`ProgressStartFilter`], which only lets
//! [`OutputEvent::ProgressStart`] through.

use crate::protocol::{ProgressListener, SharedWriter};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{info_span, trace, warn, Span};

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug output
    Debug,
    /// Informational output
    Info,
    /// Lifecycle messages
    Lifecycle,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

/// Event emitted by the engine's output subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// A unit of work started
    ProgressStart {
        /// Logging category
        category: String,
        /// Human-readable description of the work
        description: String,
    },
    /// A unit of work finished
    ProgressComplete {
        /// Logging category
        category: String,
        /// Final status
        status: String,
    },
    /// A log message
    Log {
        /// Logging category
        category: String,
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },
}

/// Receives every event emitted into a logging scope
pub trait OutputEventListener: Send + Sync {
    /// Called for each event, on the emitting thread
    fn on_output(&self, event: &OutputEvent);
}

/// Receives text written to the build's standard output or error
pub trait StandardOutputListener: Send + Sync {
    /// Called with each chunk of output text
    fn on_output(&self, output: &str);
}

type ListenerList = RwLock<Vec<(u64, Arc<dyn OutputEventListener>)>>;

struct ScopeInner {
    id: u64,
    span: Span,
    listeners: ListenerList,
    next_listener_id: AtomicU64,
}

/// Logging services shared by all operations of one connection
#[derive(Clone)]
pub struct LoggingScope {
    inner: Arc<ScopeInner>,
}

impl LoggingScope {
    /// Create a fresh scope with no listeners
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);

        Self {
            inner: Arc::new(ScopeInner {
                id,
                span: info_span!("build_connection", connection = id),
                listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// Process-local identifier of this scope
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Tracing span covering work done in this scope
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Register a listener until the returned registration is dropped
    pub fn add_output_event_listener(
        &self,
        listener: Arc<dyn OutputEventListener>,
    ) -> ListenerRegistration {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        ListenerRegistration {
            scope: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver an event to every registered listener
    pub fn emit(&self, event: OutputEvent) {
        trace!(connection = self.inner.id, ?event, "Output event");

        // Snapshot so listeners may register or drop registrations re-entrantly
        let listeners: Vec<Arc<dyn OutputEventListener>> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.on_output(&event);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for LoggingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoggingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingScope")
            .field("id", &self.inner.id)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Keeps a listener registered; removes it on drop
#[must_use = "the listener is removed when the registration is dropped"]
pub struct ListenerRegistration {
    scope: Weak<ScopeInner>,
    id: u64,
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.upgrade() {
            scope
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Forwards progress-start descriptions to a client progress listener
pub struct ProgressStartFilter {
    listener: Arc<dyn ProgressListener>,
}

impl ProgressStartFilter {
    /// Wrap a client progress listener
    pub fn new(listener: Arc<dyn ProgressListener>) -> Self {
        Self { listener }
    }
}

impl OutputEventListener for ProgressStartFilter {
    fn on_output(&self, event: &OutputEvent) {
        if let OutputEvent::ProgressStart { description, .. } = event {
            self.listener.status_changed(description);
        }
    }
}

/// Writes engine output text into a client sink
pub struct StreamBackedListener {
    sink: SharedWriter,
}

impl StreamBackedListener {
    /// Wrap a client sink
    pub fn new(sink: SharedWriter) -> Self {
        Self { sink }
    }
}

impl StandardOutputListener for StreamBackedListener {
    fn on_output(&self, output: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = sink.write_all(output.as_bytes()).and_then(|_| sink.flush()) {
            warn!("Failed to forward build output: {}", e);
        }
    }
}
