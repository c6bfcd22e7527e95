//! Result delivery contract
//!
//! Both branches of [`ResultHandler`] consume the handler, so a handler can
//! never be notified twice. [`HandlerGuard`] closes the other gap: a guard
//! dropped before delivery reports a failure, so a handler is never left
//! without a notification either.

use crate::error::{ConnectionError, Result};
use tokio::sync::oneshot;
use tracing::warn;

/// Receives the outcome of an asynchronous operation
///
/// Exactly one method is called, exactly once, from the worker thread.
pub trait ResultHandler<T>: Send {
    /// The operation succeeded
    fn on_complete(self: Box<Self>, result: T);

    /// The operation failed
    fn on_failure(self: Box<Self>, failure: ConnectionError);
}

impl<T: Send> ResultHandler<T> for oneshot::Sender<Result<T>> {
    fn on_complete(self: Box<Self>, result: T) {
        // The receiver may have been dropped by a caller that lost interest
        let _ = self.send(Ok(result));
    }

    fn on_failure(self: Box<Self>, failure: ConnectionError) {
        let _ = self.send(Err(failure));
    }
}

/// Create a handler whose outcome can be awaited (or `blocking_recv`ed)
pub fn channel_handler<T: Send + 'static>(
) -> (Box<dyn ResultHandler<T>>, oneshot::Receiver<Result<T>>) {
    let (tx, rx) = oneshot::channel();
    (Box::new(tx), rx)
}

/// Handler built from a pair of closures
pub struct FnHandler<C, F> {
    on_complete: C,
    on_failure: F,
}

/// Create a handler from a success closure and a failure closure
pub fn handler_fn<T, C, F>(on_complete: C, on_failure: F) -> Box<dyn ResultHandler<T>>
where
    T: 'static,
    C: FnOnce(T) + Send + 'static,
    F: FnOnce(ConnectionError) + Send + 'static,
{
    Box::new(FnHandler {
        on_complete,
        on_failure,
    })
}

impl<T, C, F> ResultHandler<T> for FnHandler<C, F>
where
    C: FnOnce(T) + Send,
    F: FnOnce(ConnectionError) + Send,
{
    fn on_complete(self: Box<Self>, result: T) {
        (self.on_complete)(result)
    }

    fn on_failure(self: Box<Self>, failure: ConnectionError) {
        (self.on_failure)(failure)
    }
}

/// Owns a handler until its operation resolves
pub(crate) struct HandlerGuard<T> {
    handler: Option<Box<dyn ResultHandler<T>>>,
    operation: &'static str,
}

impl<T> HandlerGuard<T> {
    pub(crate) fn new(handler: Box<dyn ResultHandler<T>>, operation: &'static str) -> Self {
        Self {
            handler: Some(handler),
            operation,
        }
    }

    /// Deliver the outcome to the handler
    pub(crate) fn deliver(mut self, outcome: Result<T>) {
        if let Some(handler) = self.handler.take() {
            match outcome {
                Ok(result) => handler.on_complete(result),
                Err(failure) => handler.on_failure(failure),
            }
        }
    }

    /// Release the handler without notifying it
    ///
    /// Only for requests that were rejected synchronously.
    pub(crate) fn disarm(mut self) {
        self.handler = None;
    }
}

impl<T> Drop for HandlerGuard<T> {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            warn!("{} dropped without a result", self.operation);
            handler.on_failure(ConnectionError::Unexpected(format!(
                "{} was dropped without a result",
                self.operation
            )));
        }
    }
}
